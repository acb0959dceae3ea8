use super::flow::RunKind;
use std::fmt;

/// Upload service every flow is submitted to.
pub const PAYMENT_SERVICE: &str = "payment";

/// Mock endpoint names, as configured under `payload.mock`.
pub const SANCTIONS: &str = "sanctions";
pub const FUND_CONTROL: &str = "fundcontrol";
pub const POSTING: &str = "posting";
pub const CLEARING: &str = "clearing";

pub const SANCTIONS_PASSED: &str = "PASSED";
pub const SANCTIONS_REJECTED: &str = "FAILED_REJECT";
pub const CLEARING_ACK: &str = "Technical Ack, Settlement Ack";
pub const BOOK_FUNDS_ACK: &str = "cr:rq:ack";
pub const BOOK_POSTING_ACK: &str = "cr:dda:ack";

/// Clearing scheme a flow settles through, derived from its name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClearingSystem {
    SgFast,
    MyRpp,
    AuNpp,
}

impl ClearingSystem {
    /// `sgp` is checked before `mys`; a name carrying neither marker settles on `AU_NPP`.
    pub fn for_flow(flow: &str) -> Self {
        if flow.contains("sgp") {
            Self::SgFast
        } else if flow.contains("mys") {
            Self::MyRpp
        } else {
            Self::AuNpp
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SgFast => "SG_FAST",
            Self::MyRpp => "MY_RPP",
            Self::AuNpp => "AU_NPP",
        }
    }
}

impl fmt::Display for ClearingSystem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Money direction of a leg, selecting the debit or credit wording of acknowledgements.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Debit,
    Credit,
}

impl Direction {
    /// Forward legs of debit flows are debits; return legs run the other way.
    pub fn of(is_debit_flow: bool, kind: RunKind) -> Self {
        match (is_debit_flow, kind) {
            (true, RunKind::Forward) | (false, RunKind::Return) => Self::Debit,
            (false, RunKind::Forward) | (true, RunKind::Return) => Self::Credit,
        }
    }

    pub fn fas_ack(self) -> &'static str {
        match self {
            Self::Debit => "Debit Req Ack",
            Self::Credit => "Credit Req Ack",
        }
    }

    pub fn posting_ack(self) -> &'static str {
        match self {
            Self::Debit => "Debit DDA Ack",
            Self::Credit => "Credit DDA Ack",
        }
    }

    pub fn funds_mock(self) -> &'static str {
        match self {
            Self::Debit => "dr:rq:yes",
            Self::Credit => "cr:rq:yes",
        }
    }

    pub fn posting_mock(self) -> &'static str {
        match self {
            Self::Debit => "dr:dda:ack",
            Self::Credit => "cr:dda:ack",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clearing_system_from_flow_name() {
        assert_eq!(ClearingSystem::for_flow("sgp_irct_dmct"), ClearingSystem::SgFast);
        assert_eq!(ClearingSystem::for_flow("mys_orct"), ClearingSystem::MyRpp);
        assert_eq!(ClearingSystem::for_flow("aus_book"), ClearingSystem::AuNpp);
        assert_eq!(ClearingSystem::AuNpp.to_string(), "AU_NPP");
    }

    #[test]
    fn test_sgp_takes_precedence_over_mys() {
        assert_eq!(ClearingSystem::for_flow("mys_to_sgp"), ClearingSystem::SgFast);
    }

    #[test]
    fn test_return_leg_inverts_direction() {
        assert_eq!(Direction::of(true, RunKind::Forward), Direction::Debit);
        assert_eq!(Direction::of(true, RunKind::Return), Direction::Credit);
        assert_eq!(Direction::of(false, RunKind::Forward), Direction::Credit);
        assert_eq!(Direction::of(false, RunKind::Return), Direction::Debit);
        assert_eq!(Direction::Debit.funds_mock(), "dr:rq:yes");
        assert_eq!(Direction::Credit.posting_ack(), "Credit DDA Ack");
    }
}
