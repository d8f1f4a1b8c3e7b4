// src/scoring/tables.rs
//! Vocabulary → number tables used by the priority scorer.
//!
//! Each lookup has two fallbacks: the value assumed when the field is missing, and the
//! number used when the field is present but not in the table.

type Table = &'static [(&'static str, f64)];

pub(crate) struct Lookup {
    table: Table,
    missing: &'static str,
    unknown: f64,
}

/// Lowercase, trim, treat `-` and spaces as `_`.
pub(crate) fn norm(s: &str) -> String {
    s.trim()
        .to_lowercase()
        .chars()
        .map(|c| if c == '-' || c == ' ' { '_' } else { c })
        .collect()
}

impl Lookup {
    pub(crate) fn get(&self, value: Option<&str>) -> f64 {
        let key = norm(value.filter(|v| !v.trim().is_empty()).unwrap_or(self.missing));
        self.table
            .iter()
            .find(|(k, _)| *k == key)
            .map(|(_, v)| *v)
            .unwrap_or(self.unknown)
    }
}

pub(crate) const SCOPE: Lookup = Lookup {
    table: &[
        ("individual", 20.0),
        ("team", 40.0),
        ("department", 60.0),
        ("company", 80.0),
        ("ecosystem", 100.0),
    ],
    missing: "individual",
    unknown: 40.0,
};

pub(crate) const SCOPE_USERS: Lookup = Lookup {
    table: &[
        ("individual", 100.0),
        ("team", 500.0),
        ("department", 2000.0),
        ("company", 10000.0),
        ("ecosystem", 50000.0),
    ],
    missing: "individual",
    unknown: 500.0,
};

pub(crate) const PAIN: Lookup = Lookup {
    table: &[
        ("enhancement", 25.0),
        ("minor_inconvenience", 40.0),
        ("major_friction", 70.0),
        ("blocker", 100.0),
    ],
    missing: "minor_inconvenience",
    unknown: 40.0,
};

pub(crate) const FREQUENCY: Lookup = Lookup {
    table: &[
        ("rarely", 0.7),
        ("sometimes", 1.0),
        ("often", 1.3),
        ("always", 1.5),
    ],
    missing: "sometimes",
    unknown: 1.0,
};

pub(crate) const FREQUENCY_USERS: Lookup = Lookup {
    table: &[
        ("always", 1.0),
        ("often", 0.8),
        ("sometimes", 0.5),
        ("rarely", 0.2),
    ],
    missing: "sometimes",
    unknown: 0.5,
};

pub(crate) const TIMELINE: Lookup = Lookup {
    table: &[
        ("immediate", 1.5),
        ("sprint", 1.2),
        ("quarter", 1.0),
        ("roadmap", 0.8),
    ],
    missing: "sprint",
    unknown: 1.0,
};

pub(crate) const TIMELINE_PRESSURE: Lookup = Lookup {
    table: &[
        ("immediate", 1.0),
        ("sprint", 0.7),
        ("quarter", 0.4),
        ("roadmap", 0.2),
    ],
    missing: "sprint",
    unknown: 0.5,
};

pub(crate) const COMPLEXITY: Lookup = Lookup {
    table: &[
        ("low", 25.0),
        ("medium", 50.0),
        ("high", 75.0),
        ("very_high", 100.0),
    ],
    missing: "medium",
    unknown: 50.0,
};

pub(crate) const COMPLEXITY_RISK: Lookup = Lookup {
    table: &[
        ("low", 0.1),
        ("medium", 0.3),
        ("high", 0.6),
        ("very_high", 0.8),
    ],
    missing: "medium",
    unknown: 0.3,
};

pub(crate) const EFFORT: Lookup = Lookup {
    table: &[
        ("hours", 20.0),
        ("days", 40.0),
        ("weeks", 70.0),
        ("months", 90.0),
    ],
    missing: "days",
    unknown: 50.0,
};

pub(crate) const BUSINESS_VALUE: Lookup = Lookup {
    table: &[
        ("efficiency", 40.0),
        ("retention", 60.0),
        ("acquisition", 80.0),
        ("revenue", 100.0),
        ("compliance", 70.0),
    ],
    missing: "efficiency",
    unknown: 50.0,
};

pub(crate) const COMPETITIVE: Lookup = Lookup {
    table: &[
        ("differentiator", 1.4),
        ("parity", 1.0),
        ("table_stakes", 1.2),
        ("internal", 0.8),
    ],
    missing: "parity",
    unknown: 1.0,
};

pub(crate) const ALIGNMENT: Lookup = Lookup {
    table: &[
        ("off_strategy", 20.0),
        ("nice_to_have", 40.0),
        ("important", 70.0),
        ("core", 100.0),
    ],
    missing: "important",
    unknown: 50.0,
};

pub(crate) const REQUIREMENT_PRIORITY: Lookup = Lookup {
    table: &[
        ("wont_have", 20.0),
        ("could_have", 40.0),
        ("should_have", 70.0),
        ("must_have", 100.0),
    ],
    missing: "should_have",
    unknown: 50.0,
};
