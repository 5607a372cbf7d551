use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum SimError {
    #[error("invalid parameter {name}: {reason}")]
    InvalidParameter { name: &'static str, reason: String },

    #[error(
        "cell (agent {agent_id}, year {year}) is outside the {agent_count} x {year_count} matrix"
    )]
    OutOfRange {
        agent_id: u32,
        year: u32,
        agent_count: u32,
        year_count: u32,
    },
}

impl SimError {
    pub(crate) fn invalid(name: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidParameter {
            name,
            reason: reason.into(),
        }
    }
}
