//! Who may submit which call.

use crate::state::State;
use crate::{Call, ManagerError, Precondition};
use candid::Principal;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Access {
    /// Any member of the admin set.
    Admin,
    /// The single designated operator.
    Operator,
    /// Permissionless.
    Anyone,
}

impl Call {
    pub fn access(&self) -> Access {
        match self {
            Call::InitializePosition { .. }
            | Call::DepositCollateral { .. }
            | Call::WithdrawCollateral { .. }
            | Call::DrawDebt { .. }
            | Call::RepayDebt { .. }
            | Call::ReleaseCollateral { .. }
            | Call::SetOperator { .. } => Access::Operator,
            Call::Tell
            | Call::Sink
            | Call::Migrate { .. }
            | Call::Rely { .. }
            | Call::Deny { .. }
            | Call::File { .. } => Access::Admin,
            // Proceeds only flow to the operator or against the debt, so anyone
            // may push them through. Cage applies its own gate.
            Call::Unwind { .. } | Call::Recover { .. } | Call::Cage => Access::Anyone,
        }
    }
}

pub fn authorize(state: &State, caller: Principal, access: Access) -> Result<(), ManagerError> {
    match access {
        Access::Admin if !state.is_admin(&caller) => Err(Precondition::NotAuthorized.into()),
        Access::Operator if caller != state.operator => Err(Precondition::NotOperator.into()),
        _ => Ok(()),
    }
}
