// tests/filter_sampling.rs
use feedback_pipeline::analyze::{
    DimensionScores, EscalationReason, FilterEngine, RandomSource, StdRandom,
};
use feedback_pipeline::config::FilterConfig;
use feedback_pipeline::record::{Sentiment, UserInfo};
use std::sync::Arc;

const MID_BAND: &str = "Why does the export screen feel so useless compared to before";
const VIP_CRASH: &str = "App crashes every time I log in, please fix immediately";

/// Always draws the same value.
struct Fixed(f64);

impl RandomSource for Fixed {
    fn next_unit(&self) -> f64 {
        self.0
    }
}

fn vip() -> UserInfo {
    UserInfo {
        is_vip: true,
        ..Default::default()
    }
}

#[test]
fn mid_band_escalation_rate_matches_probability() {
    let filter =
        FilterEngine::with_random(&FilterConfig::default(), Arc::new(StdRandom::seeded(42))).unwrap();
    let user = UserInfo::default();

    let trials = 10_000;
    let mut escalated = 0usize;
    for _ in 0..trials {
        let d = filter.evaluate(MID_BAND, &user).unwrap();
        assert!(d.priority_score >= 0.4 && d.priority_score < 0.7);
        if d.should_escalate {
            assert_eq!(d.reason, EscalationReason::SampledIn);
            escalated += 1;
        }
    }
    let rate = escalated as f64 / trials as f64;
    assert!((rate - 0.3).abs() < 0.03, "escalation rate {rate}");
}

#[test]
fn configured_probability_is_respected() {
    let cfg = FilterConfig {
        escalation_probability: 0.0,
        ..FilterConfig::default()
    };
    let filter = FilterEngine::with_random(&cfg, Arc::new(StdRandom::seeded(1))).unwrap();
    for _ in 0..1_000 {
        assert!(!filter.evaluate(MID_BAND, &UserInfo::default()).unwrap().should_escalate);
    }
}

#[test]
fn high_priority_escalates_regardless_of_the_draw() {
    // a draw of 0.999 would sample out anything in the mid band
    let filter = FilterEngine::with_random(&FilterConfig::default(), Arc::new(Fixed(0.999))).unwrap();
    let d = filter.evaluate(VIP_CRASH, &vip()).unwrap();
    assert!(d.priority_score >= 0.7, "priority {}", d.priority_score);
    assert!(d.should_escalate);
    assert_eq!(d.reason, EscalationReason::HighPriority);
    assert_eq!(d.sentiment, Sentiment::Negative);
    assert_eq!(d.category, "bug");

    let dims = DimensionScores {
        quality: 0.5,
        ..Default::default()
    };
    for p in [0.7, 0.85, 1.0] {
        assert_eq!(filter.decide(&dims, p), (true, EscalationReason::HighPriority));
    }
}

#[test]
fn priority_stays_in_unit_range() {
    let filter = FilterEngine::with_random(&FilterConfig::default(), Arc::new(Fixed(0.5))).unwrap();
    let texts = [
        "ok then",
        "!!!!!!!!!!!!!!!!!!!!!!!",
        "I love this app, it is wonderful and great",
        "Login is broken, crash, crash, error, bug, urgent, immediately, fix now, data lost",
        "界面卡顿严重，每次打开都闪退，请尽快修复",
    ];
    for t in texts {
        for user in [UserInfo::default(), vip()] {
            let d = filter.evaluate_or_default(t, &user);
            assert!((0.0..=1.0).contains(&d.priority_score), "{t}: {}", d.priority_score);
            assert!((0.0..=1.0).contains(&d.confidence));
        }
    }
}
