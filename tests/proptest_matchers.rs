//! Property-based coverage of the pattern-matcher determinism invariant
//! (§8 item 5) and the primitive-operator list-as-OR invariant (§8 item 7).

use abac_pdp::{ConditionLimitsConfig, EvaluationContext, RegexCache, Subject, UserSubject, Value};
use proptest::prelude::*;

fn segment() -> impl Strategy<Value = String> {
    "[a-z]{1,6}"
}

fn colon_triplet() -> impl Strategy<Value = String> {
    (segment(), segment(), segment()).prop_map(|(a, b, c)| format!("{a}:{b}:{c}"))
}

proptest! {
    // Matching a fixed-arity string against itself with the last segment
    // wildcarded is always true, and arity mismatches are always false,
    // regardless of which concrete segments are generated.
    #[test]
    fn action_matcher_is_pure_and_arity_sensitive(requested in colon_triplet()) {
        let cache = RegexCache::new(None);
        let parts: Vec<&str> = requested.splitn(3, ':').collect();
        let wildcard_pattern = format!("{}:{}:*", parts[0], parts[1]);
        prop_assert!(abac_pdp::policy::action_matcher::matches(&wildcard_pattern, &requested, &cache));

        let extra_arity_pattern = format!("{}:{}:{}:extra", parts[0], parts[1], parts[2]);
        prop_assert!(!abac_pdp::policy::action_matcher::matches(&extra_arity_pattern, &requested, &cache));

        // Same inputs, evaluated twice, must agree (pure function of its inputs).
        let first = abac_pdp::policy::action_matcher::matches(&wildcard_pattern, &requested, &cache);
        let second = abac_pdp::policy::action_matcher::matches(&wildcard_pattern, &requested, &cache);
        prop_assert_eq!(first, second);
    }

    // StringEquals against a list of candidates is true iff the actual value
    // equals at least one candidate, for any generated candidate set.
    #[test]
    fn string_equals_list_expected_is_logical_or(
        actual in segment(),
        candidates in prop::collection::vec(segment(), 1..6),
    ) {
        let condition: abac_pdp::Condition = serde_json::from_str(&format!(
            r#"{{"StringEquals": {{"user:tag": {}}}}}"#,
            serde_json::to_string(&candidates).unwrap()
        ))
        .unwrap();

        let subject = UserSubject::new("u1", "User One");
        let mut ctx: EvaluationContext = abac_pdp::ContextBuilder::new(&subject, "a:b:c", "r:s:t")
            .build()
            .unwrap();
        ctx.insert("user:tag", Value::String(actual.clone()));

        let cache = RegexCache::new(None);
        let limits = ConditionLimitsConfig::default();
        let expected_or = candidates.iter().any(|c| *c == actual);
        prop_assert_eq!(condition.evaluate(&ctx, &cache, &limits, None), expected_or);
    }
}

#[test]
fn subject_trait_object_is_usable_as_any_subject() {
    let subject: Box<dyn Subject> = Box::new(UserSubject::new("u1", "Alice"));
    assert_eq!(subject.id(), "u1");
}
