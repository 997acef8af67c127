pub mod compositor;
pub mod eligibility;
pub mod files;
pub mod ledger;
pub mod reconcile;
pub mod revert;

#[cfg(test)]
mod testing;

pub use compositor::{composite, Compositor};
pub use eligibility::{assess, Eligibility, EligibilityEvaluator, Ineligible};
pub use ledger::{LedgerEntry, OverlayLedger, OverlayMode, RestoreData, SeasonRecord};
pub use reconcile::{ReconcileOptions, ReconcileReport, Reconciler};
pub use revert::{build_strategy, BackupFileStrategy, PosterIdStrategy, ResetStrategy, RevertStrategy};
