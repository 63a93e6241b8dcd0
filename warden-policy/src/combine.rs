use warden_core::PolicyResponse;

/// Fold per-field decisions into one.
///
/// The first non-PERMIT decision wins. If every decision permits, the first
/// one is returned. No decisions at all yields `None`, which callers treat
/// as not authorized.
pub fn combine_decisions(decisions: &[PolicyResponse]) -> Option<PolicyResponse> {
    decisions
        .iter()
        .find(|d| !d.is_permit())
        .or_else(|| decisions.first())
        .cloned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use warden_core::DecisionType;

    #[test]
    fn test_first_denial_wins() {
        let decisions = vec![
            PolicyResponse::permit(),
            PolicyResponse::deny("field X"),
            PolicyResponse::permit(),
            PolicyResponse::deny("field Y"),
        ];
        let overall = combine_decisions(&decisions).unwrap();
        assert_eq!(overall.decision, DecisionType::Deny);
        assert_eq!(overall.message.as_deref(), Some("field X"));
    }

    #[test]
    fn test_all_permit() {
        let overall = combine_decisions(&[PolicyResponse::permit(), PolicyResponse::permit()]);
        assert!(overall.unwrap().is_permit());
    }

    #[test]
    fn test_no_decisions() {
        assert!(combine_decisions(&[]).is_none());
    }

    fn decision_strategy() -> impl Strategy<Value = PolicyResponse> {
        prop_oneof![
            Just(DecisionType::Permit),
            Just(DecisionType::Deny),
            Just(DecisionType::Indeterminate),
            Just(DecisionType::NotApplicable),
            Just(DecisionType::Invalid),
        ]
        .prop_map(|d| PolicyResponse::new(d, None))
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        #[test]
        fn prop_any_denial_denies(decisions in proptest::collection::vec(decision_strategy(), 1..12)) {
            let overall = combine_decisions(&decisions).unwrap();
            let all_permit = decisions.iter().all(PolicyResponse::is_permit);
            prop_assert_eq!(overall.is_permit(), all_permit);
            if !all_permit {
                let first_denial = decisions.iter().find(|d| !d.is_permit()).unwrap();
                prop_assert_eq!(&overall, first_denial);
            }
        }
    }
}
