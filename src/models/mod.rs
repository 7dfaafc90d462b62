pub mod dimension;
pub mod loaders;
pub mod question;
pub mod reference;
pub mod report;

pub use dimension::Dimension;
pub use question::Question;
pub use reference::{ReferenceEntry, ReferenceSet};
pub use report::{
    AuditReport, CorrectionRecommendation, DimensionMapping, DimensionRating, DimensionSummary,
    MappingRecommendation, Rating, RatingReport, RatingResult, RatingSummary, TokenUsage,
    UnresolvedItem,
};
