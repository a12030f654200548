use serde::Serialize;

/// The six account-level heuristics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum RuleId {
    /// Many-source aggregation forwarded almost unchanged to few addresses.
    H1,
    /// Many-source aggregation with no outflow.
    H2,
    /// Single inflow fanned out to many addresses.
    H3,
    /// Many-in, many-out relay with minimal retention.
    H4,
    /// Heavy two-node loop participation.
    H5,
    /// Heavy triangle loop participation.
    H6,
}

impl RuleId {
    pub const ALL: [RuleId; 6] = [Self::H1, Self::H2, Self::H3, Self::H4, Self::H5, Self::H6];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::H1 => "H1",
            Self::H2 => "H2",
            Self::H3 => "H3",
            Self::H4 => "H4",
            Self::H5 => "H5",
            Self::H6 => "H6",
        }
    }

    /// H1..H4 share the single "main" point of the raw score.
    pub fn is_main(&self) -> bool {
        matches!(self, Self::H1 | Self::H2 | Self::H3 | Self::H4)
    }

    pub fn description(&self) -> &'static str {
        match self {
            Self::H1 => "H1: Aggregates from many sources and forwards almost unchanged to few addresses. May indicate ransomware or scam fund routing.",
            Self::H2 => "H2: Aggregates from many sources but shows no outgoing transfers. May indicate scam fund storage or ransomware holding address.",
            Self::H3 => "H3: Receives funds from a single source and distributes to many addresses. May indicate laundering or scam profit distribution.",
            Self::H4 => "H4: Receives from many sources and distributes to many others with minimal balance retained. Possible mixer or laundering relay.",
            Self::H5 => "H5: Participates in closed two-node loops with high value or frequent transfers. May indicate wash trading or self-laundering.",
            Self::H6 => "H6: Participates in closed triangle-shaped loops with high value or frequent transfers. May indicate self-laundering or obfuscation.",
        }
    }

    fn index(&self) -> usize {
        *self as usize
    }
}

/// Rule evaluation of one non-infra account.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct RuleOutcome {
    flags: [bool; 6],
}

impl RuleOutcome {
    pub fn set(&mut self, rule: RuleId, fired: bool) {
        self.flags[rule.index()] = fired;
    }

    pub fn fired(&self, rule: RuleId) -> bool {
        self.flags[rule.index()]
    }

    pub fn fired_rules(&self) -> impl Iterator<Item = RuleId> + '_ {
        RuleId::ALL.into_iter().filter(|r| self.fired(*r))
    }

    /// 1 if any main rule fired, plus 1 per fired cycle rule: 0..=3.
    pub fn raw_score(&self) -> u8 {
        let main = RuleId::ALL.iter().any(|r| r.is_main() && self.fired(*r)) as u8;
        let cycles = self.fired(RuleId::H5) as u8 + self.fired(RuleId::H6) as u8;
        main + cycles
    }

    /// `raw_score * 100 / 3`, rounded to two decimals.
    pub fn scaled_score(&self) -> f64 {
        round2(self.raw_score() as f64 * 100.0 / 3.0)
    }

    /// Description of `rule` if it fired, empty otherwise.
    pub fn description(&self, rule: RuleId) -> &'static str {
        if self.fired(rule) {
            rule.description()
        } else {
            ""
        }
    }
}

pub(crate) fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_raw_score_caps_main_rules() {
        let mut outcome = RuleOutcome::default();
        assert_eq!(outcome.raw_score(), 0);
        assert_eq!(outcome.scaled_score(), 0.0);

        outcome.set(RuleId::H1, true);
        outcome.set(RuleId::H4, true);
        assert_eq!(outcome.raw_score(), 1);
        assert_eq!(outcome.scaled_score(), 33.33);

        outcome.set(RuleId::H5, true);
        assert_eq!(outcome.scaled_score(), 66.67);

        outcome.set(RuleId::H6, true);
        assert_eq!(outcome.raw_score(), 3);
        assert_eq!(outcome.scaled_score(), 100.0);
    }

    #[test]
    fn test_descriptions_only_for_fired_rules() {
        let mut outcome = RuleOutcome::default();
        outcome.set(RuleId::H2, true);
        assert!(outcome.description(RuleId::H2).starts_with("H2:"));
        assert_eq!(outcome.description(RuleId::H3), "");
        assert_eq!(outcome.fired_rules().collect::<Vec<_>>(), vec![RuleId::H2]);
    }
}
