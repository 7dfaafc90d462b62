//! 审核维度枚举
//!
//! 每个维度是一条分类轴，题目可以沿任意维度被映射到参考体系中的编码

use regex::Regex;

/// 审核维度
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Dimension {
    /// 主题领域（topic / subtopic 两级）
    AreaTopics,
    /// 能力（C 编码）
    Competency,
    /// 目标（O 编码）
    Objective,
    /// 技能（S 编码）
    Skill,
    /// NMC 能力框架（MI 编码）
    NmcCompetency,
    /// 布鲁姆认知层级（KL 编码）
    Blooms,
    /// 难度（Easy / Medium / Hard）
    Complexity,
}

impl Dimension {
    /// 全部维度
    pub fn all() -> [Dimension; 7] {
        [
            Dimension::AreaTopics,
            Dimension::Competency,
            Dimension::Objective,
            Dimension::Skill,
            Dimension::NmcCompetency,
            Dimension::Blooms,
            Dimension::Complexity,
        ]
    }

    /// 获取维度键名（用于列名 `mapped_<key>` 和配置）
    pub fn key(self) -> &'static str {
        match self {
            Dimension::AreaTopics => "area_topics",
            Dimension::Competency => "competency",
            Dimension::Objective => "objective",
            Dimension::Skill => "skill",
            Dimension::NmcCompetency => "nmc_competency",
            Dimension::Blooms => "blooms",
            Dimension::Complexity => "complexity",
        }
    }

    /// 获取展示名称
    pub fn display_name(self) -> &'static str {
        match self {
            Dimension::AreaTopics => "Topic Areas",
            Dimension::Competency => "Competencies",
            Dimension::Objective => "Objectives",
            Dimension::Skill => "Skills",
            Dimension::NmcCompetency => "NMC Competencies",
            Dimension::Blooms => "Bloom's Levels",
            Dimension::Complexity => "Complexity Levels",
        }
    }

    /// 维度对应的编码正则（AreaTopics 没有编码前缀，用主题名）
    pub fn code_pattern(self) -> &'static str {
        match self {
            Dimension::AreaTopics => r"^.+$",
            Dimension::Competency => r"^C\d+(\.\d+)?$",
            Dimension::Objective => r"^O\d+(\.\d+)?$",
            Dimension::Skill => r"^S\d+(\.\d+)?$",
            Dimension::NmcCompetency => r"^MI\d+(\.\d+)?$",
            Dimension::Blooms => r"^KL\d+$",
            Dimension::Complexity => r"^(Easy|Medium|Hard)$",
        }
    }

    /// 判断编码是否符合本维度的形态
    pub fn matches_code(self, code: &str) -> bool {
        let code = code.trim();
        if code.is_empty() {
            return false;
        }
        Regex::new(self.code_pattern())
            .map(|re| re.is_match(code))
            .unwrap_or(false)
    }

    /// 从键名解析维度
    pub fn from_key(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "area_topics" | "area topics" | "topics" => Some(Dimension::AreaTopics),
            "competency" | "competencies" => Some(Dimension::Competency),
            "objective" | "objectives" => Some(Dimension::Objective),
            "skill" | "skills" => Some(Dimension::Skill),
            "nmc_competency" | "nmc" => Some(Dimension::NmcCompetency),
            "blooms" | "bloom" => Some(Dimension::Blooms),
            "complexity" | "difficulty" => Some(Dimension::Complexity),
            _ => None,
        }
    }

    /// 题目文件中已有映射的列名
    pub fn mapped_column(self) -> String {
        format!("mapped_{}", self.key())
    }
}

impl std::fmt::Display for Dimension {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.key())
    }
}
