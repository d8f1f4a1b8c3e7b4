// src/config/keywords.rs
//! Vocabulary used by the heuristic filter.
//!
//! ASCII terms are matched on word boundaries against lowercased text, CJK terms as plain
//! substrings. Patterns are regular expressions compiled case-insensitively by the filter.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeywordCategory {
    pub name: String,
    pub terms: Vec<String>,
}

impl KeywordCategory {
    fn new(name: &str, terms: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            terms: owned(terms),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct KeywordProfile {
    /// Business categories in precedence order; the first match names the heuristic category.
    pub categories: Vec<KeywordCategory>,
    pub urgency: Vec<String>,
    pub positive: Vec<String>,
    pub negative: Vec<String>,
    pub product_words: Vec<String>,
    /// Interrogatives and reproduction hints that make feedback actionable.
    pub specificity_markers: Vec<String>,
    pub severity_patterns: Vec<String>,
    pub novelty_patterns: Vec<String>,
    pub emotion_only_patterns: Vec<String>,
    pub stopwords: Vec<String>,
}

fn owned(v: &[&str]) -> Vec<String> {
    v.iter().map(|s| s.to_string()).collect()
}

impl Default for KeywordProfile {
    fn default() -> Self {
        Self {
            categories: vec![
                KeywordCategory::new(
                    "bug",
                    &[
                        "bug", "bugs", "crash", "crashes", "crashed", "crashing", "error",
                        "errors", "broken", "freeze", "freezes", "frozen", "glitch", "fails",
                        "failed", "崩溃", "错误", "异常", "故障", "问题", "卡顿", "闪退",
                    ],
                ),
                KeywordCategory::new(
                    "feature",
                    &[
                        "feature", "features", "request", "wish", "would like", "please add",
                        "add support", "support for", "suggestion", "improve", "功能", "需求",
                        "建议", "希望", "增加", "改进", "优化",
                    ],
                ),
                KeywordCategory::new(
                    "performance",
                    &[
                        "slow", "slowly", "lag", "laggy", "latency", "loading", "takes forever",
                        "performance", "battery", "慢", "卡", "延迟", "响应", "加载", "速度",
                    ],
                ),
                KeywordCategory::new(
                    "ui_ux",
                    &[
                        "ui", "ux", "interface", "design", "layout", "button", "screen", "font",
                        "color", "colour", "dark mode", "界面", "设计", "布局", "颜色", "字体",
                        "操作", "体验",
                    ],
                ),
                KeywordCategory::new(
                    "security",
                    &[
                        "security", "privacy", "password", "permission", "permissions", "leak",
                        "login", "log in", "sign in", "account", "安全", "隐私", "权限", "泄露",
                        "保护",
                    ],
                ),
                KeywordCategory::new(
                    "integration",
                    &[
                        "integration", "integrate", "sync", "syncing", "import", "export", "api",
                        "compatible", "compatibility", "集成", "兼容", "同步", "导入", "导出",
                    ],
                ),
            ],
            urgency: owned(&[
                "urgent", "urgently", "asap", "immediately", "critical", "serious", "blocker",
                "blocking", "unusable", "right now", "data loss", "紧急", "严重", "重要", "关键",
                "阻塞", "无法使用", "影响工作", "损失", "立即", "马上",
            ]),
            positive: owned(&[
                "good", "great", "love", "excellent", "awesome", "nice", "helpful", "amazing",
                "perfect", "thanks", "好", "棒", "喜欢", "满意", "优秀", "方便", "赞",
            ]),
            negative: owned(&[
                "bad", "terrible", "awful", "hate", "crash", "crashes", "crashed", "broken",
                "useless", "annoying", "worst", "disappointed", "slow", "差", "烂", "糟糕",
                "失望", "垃圾", "崩溃", "讨厌",
            ]),
            product_words: owned(&[
                "app", "feature", "function", "screen", "page", "button", "setting", "settings",
                "update", "version", "功能", "界面", "操作", "使用", "体验", "问题", "建议",
            ]),
            specificity_markers: owned(&[
                "how", "why", "when", "where", "what", "every time", "steps", "after updating",
                "什么时候", "如何", "为什么", "在哪里",
            ]),
            severity_patterns: owned(&[
                r"completely (unable|impossible)",
                r"every ?time",
                r"(always|constantly) .*(crash|fail|freez|error)",
                r"(can ?not|can't|cannot) .*at all",
                r"完全无法.*",
                r"一直.*问题",
                r"每次都.*",
                r"根本.*不.*",
            ]),
            novelty_patterns: owned(&[
                r"\bv?\d+\.\d+(\.\d+)?\b",
                r"\bversion \d+",
                r"\b(on|in) the \w+ (page|screen|tab|menu)\b",
                r"\b(click|tap)(ing|ping|ped|ed)? (on )?the \w+ button\b",
                r"版本\d+",
                r"V\d+\.\d+",
                r"在.*页面",
                r"点击.*按钮",
            ]),
            emotion_only_patterns: owned(&[
                r"^[很非常太极超]+[好坏差棒糟烂]*[！!]*$",
                r"^[哈呵嘿嘻]+$",
                r"^[。，,！!？?]*$",
                r"^(so |very |really )*(good|bad|great|awesome|terrible|nice|cool|meh|lol|haha|wow|ok|okay)[!.\s]*$",
            ]),
            stopwords: owned(&[
                "the", "and", "for", "are", "but", "not", "you", "all", "any", "can", "had",
                "her", "was", "one", "our", "out", "has", "have", "this", "that", "with", "from",
                "they", "will", "would", "there", "their", "what", "when", "where", "which",
                "your", "just", "very", "please", "time", "every", "also", "into", "than",
                "then", "them", "been", "its", "it's", "i'm", "don't", "的", "了", "在", "是",
                "我", "有", "和", "就", "不", "人", "都", "一个", "也", "很", "到", "说", "要",
                "去", "你", "会", "着", "没有", "看", "好", "自己", "这",
            ]),
        }
    }
}

impl KeywordProfile {
    pub fn category_names(&self) -> Vec<&str> {
        self.categories.iter().map(|c| c.name.as_str()).collect()
    }
}
