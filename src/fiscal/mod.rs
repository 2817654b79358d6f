//! VAT liability and micro-entreprise bookkeeping.
//!
//! This module contains:
//! - the net revenue calculator, which splits an income into fees, social
//!   contributions and what the owner keeps,
//! - the threshold monitor and its running yearly totals,
//! - the workflow that moves an owner in and out of VAT liability,
//! - the regularization of incomes recorded before VAT applied.

mod endpoints;
mod net_revenue;
mod profile;
mod regularization;
mod threshold;
mod workflow;

pub use endpoints::{
    apply_regularization_endpoint, discard_activation_endpoint, get_fiscal_profile_endpoint,
    get_fiscal_summary_endpoint, get_pending_regularization_endpoint, reconcile_endpoint,
    resolve_activation_endpoint, resolve_reversion_endpoint, set_vat_subjection_endpoint,
};
pub use net_revenue::{NetRevenue, NetRevenueSummary, calculate_net_revenue, summarize_net_revenue};
pub use profile::{
    FiscalProfile, FiscalState, PendingTrigger, create_fiscal_profile_table, get_fiscal_profile,
};
pub use regularization::{
    RegularizationPrompt, RegularizationReport, RegularizationStatus, apply_regularization,
    create_pending_regularization_table, get_pending_regularization,
};
pub use threshold::{
    CeilingStatus, Reconciliation, ThresholdReport, build_threshold_report,
    create_revenue_total_table, reconcile_all_running_totals, reconcile_year_total,
};
pub use workflow::{
    ActivationChoice, ActivationPrompt, ActivationResult, MutationOutcome, ReversionPrompt,
    discard_pending_activation, resolve_activation, resolve_reversion, set_vat_subjection,
    submit_delete, submit_edit, submit_new_transaction,
};
