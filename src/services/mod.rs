mod reconciliation;
mod validation;

pub use reconciliation::{ReconciliationService, RunReport};
pub use validation::{DuplicateName, IntegrityReport, IntegrityValidator, ValidationIssue};
