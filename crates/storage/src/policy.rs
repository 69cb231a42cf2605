//! Durability policy per operation
//!
//! Losing an assessment or an export is severe enough that the caller must be
//! told; every other write is best-effort. The table lives here so callers can
//! look up how any operation reports failure.

use serde::{Deserialize, Serialize};
use std::fmt;

/// How an operation reports a storage failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Durability {
    /// Failure is returned to the caller as an error
    Required,
    /// Failure is logged and reported as `false` or `None`
    BestEffort,
}

/// Write-side operations of the persistence manager
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Operation {
    /// Store a new assessment
    SaveAssessment,
    /// Remove one assessment
    DeleteAssessment,
    /// Overwrite the user profile
    SaveUserProfile,
    /// Store a new session
    SaveSession,
    /// Store one preference
    SavePreference,
    /// Serialize a snapshot of all data
    ExportData,
    /// Restore a snapshot
    ImportData,
    /// Wipe every collection
    ClearAllData,
}

impl Operation {
    /// Every operation
    pub const ALL: [Operation; 8] = [
        Operation::SaveAssessment,
        Operation::DeleteAssessment,
        Operation::SaveUserProfile,
        Operation::SaveSession,
        Operation::SavePreference,
        Operation::ExportData,
        Operation::ImportData,
        Operation::ClearAllData,
    ];

    /// Failure policy of this operation
    pub const fn durability(self) -> Durability {
        match self {
            Operation::SaveAssessment | Operation::ExportData | Operation::ImportData => {
                Durability::Required
            }
            Operation::DeleteAssessment
            | Operation::SaveUserProfile
            | Operation::SaveSession
            | Operation::SavePreference
            | Operation::ClearAllData => Durability::BestEffort,
        }
    }

    /// Operation name used in logs
    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::SaveAssessment => "save assessment",
            Operation::DeleteAssessment => "delete assessment",
            Operation::SaveUserProfile => "save user profile",
            Operation::SaveSession => "save session",
            Operation::SavePreference => "save preference",
            Operation::ExportData => "export data",
            Operation::ImportData => "import data",
            Operation::ClearAllData => "clear all data",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_required_operations() {
        let required: Vec<Operation> = Operation::ALL
            .into_iter()
            .filter(|op| op.durability() == Durability::Required)
            .collect();

        assert_eq!(
            required,
            vec![Operation::SaveAssessment, Operation::ExportData, Operation::ImportData]
        );
    }

    #[test]
    fn test_display() {
        assert_eq!(Operation::ClearAllData.to_string(), "clear all data");
    }
}
