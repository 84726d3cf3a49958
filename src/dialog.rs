//! Modal dialogs raised during a scan and their typed resolutions
//!
//! A scan shows at most one dialog at a time. Dialogs are a sub-state of the
//! phase that raised them: [`ActiveDialog::return_to`] remembers that phase so
//! resolution lands back exactly where the session was. Each [`Dialog`] kind
//! has its own resolution variant in [`DialogResolution`], which makes a
//! mismatched answer unrepresentable.
use super::request::{Mode, Phase, ScanRequest};
use super::transaction::Transaction;

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DialogKind {
    #[n(0)]
    CurrencyMismatch,
    #[n(1)]
    TotalMismatch,
    #[n(2)]
    QuickSave,
    #[n(3)]
    ScanComplete,
    #[n(4)]
    BatchCancel,
    #[n(5)]
    BatchDiscard,
    #[n(6)]
    BatchComplete,
    #[n(7)]
    CreditWarning,
}

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, PartialEq, Eq)]
pub enum Dialog {
    #[n(0)]
    CurrencyMismatch {
        #[n(0)]
        detected: String,
        #[n(1)]
        expected: String,
    },
    #[n(1)]
    TotalMismatch {
        #[n(0)]
        extracted: i64,
        #[n(1)]
        computed: i64,
    },
    #[n(2)]
    QuickSave {
        #[n(0)]
        transactions: usize,
    },
    #[n(3)]
    ScanComplete {
        #[n(0)]
        saved: usize,
    },
    #[n(4)]
    BatchCancel {
        #[n(0)]
        unfinished: usize,
    },
    #[n(5)]
    BatchDiscard {
        #[n(0)]
        results: usize,
    },
    #[n(6)]
    BatchComplete {
        #[n(0)]
        completed: usize,
        #[n(1)]
        failed: usize,
    },
    #[n(7)]
    CreditWarning {
        #[n(0)]
        remaining: u32,
    },
}

impl Dialog {
    pub fn kind(&self) -> DialogKind {
        match self {
            Dialog::CurrencyMismatch { .. } => DialogKind::CurrencyMismatch,
            Dialog::TotalMismatch { .. } => DialogKind::TotalMismatch,
            Dialog::QuickSave { .. } => DialogKind::QuickSave,
            Dialog::ScanComplete { .. } => DialogKind::ScanComplete,
            Dialog::BatchCancel { .. } => DialogKind::BatchCancel,
            Dialog::BatchDiscard { .. } => DialogKind::BatchDiscard,
            Dialog::BatchComplete { .. } => DialogKind::BatchComplete,
            Dialog::CreditWarning { .. } => DialogKind::CreditWarning,
        }
    }
}

/// The dialog currently on screen and the phase it was raised from.
#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, PartialEq, Eq)]
pub struct ActiveDialog {
    #[n(0)]
    pub dialog: Dialog,
    #[n(1)]
    pub return_to: Phase,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CurrencyChoice {
    KeepDetected,
    UseExpected,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TotalChoice {
    KeepExtracted,
    UseLineItems,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuickSaveChoice {
    SaveNow,
    Review,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanCompleteChoice {
    Done,
    ScanAnother,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchCompleteChoice {
    Review,
    SaveAll,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DialogResolution {
    CurrencyMismatch(CurrencyChoice),
    TotalMismatch(TotalChoice),
    QuickSave(QuickSaveChoice),
    ScanComplete(ScanCompleteChoice),
    BatchCancel { confirmed: bool },
    BatchDiscard { confirmed: bool },
    BatchComplete(BatchCompleteChoice),
    CreditWarning { proceed: bool },
}

impl DialogResolution {
    pub fn kind(&self) -> DialogKind {
        match self {
            DialogResolution::CurrencyMismatch(_) => DialogKind::CurrencyMismatch,
            DialogResolution::TotalMismatch(_) => DialogKind::TotalMismatch,
            DialogResolution::QuickSave(_) => DialogKind::QuickSave,
            DialogResolution::ScanComplete(_) => DialogKind::ScanComplete,
            DialogResolution::BatchCancel { .. } => DialogKind::BatchCancel,
            DialogResolution::BatchDiscard { .. } => DialogKind::BatchDiscard,
            DialogResolution::BatchComplete(_) => DialogKind::BatchComplete,
            DialogResolution::CreditWarning { .. } => DialogKind::CreditWarning,
        }
    }
}

/// What the reducer does with the session once a resolution is applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Outcome {
    Return,
    Reset,
}

/// Applies the state-only part of a resolution. Follow-ups that need I/O
/// (saving, starting another scan) belong to the service.
pub(crate) fn apply_resolution(
    results: &mut [Transaction],
    dialog: &Dialog,
    resolution: &DialogResolution,
) -> Outcome {
    match (dialog, resolution) {
        (
            Dialog::CurrencyMismatch { expected, .. },
            DialogResolution::CurrencyMismatch(CurrencyChoice::UseExpected),
        ) => {
            for tx in results.iter_mut() {
                tx.currency = Some(expected.clone());
            }
            Outcome::Return
        }
        (Dialog::TotalMismatch { .. }, DialogResolution::TotalMismatch(TotalChoice::UseLineItems)) => {
            for tx in results.iter_mut() {
                if let Some(sum) = tx.line_item_total() {
                    tx.total = sum;
                }
            }
            Outcome::Return
        }
        (Dialog::BatchCancel { .. }, DialogResolution::BatchCancel { confirmed: true })
        | (Dialog::BatchDiscard { .. }, DialogResolution::BatchDiscard { confirmed: true }) => {
            Outcome::Reset
        }
        _ => Outcome::Return,
    }
}

/// Inputs to the dialog chain that come from user settings.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DialogPolicy {
    pub default_currency: Option<String>,
    pub quick_save: bool,
    pub show_completion: bool,
}

/// Decides which dialog, if any, the session should show next.
///
/// Single and statement reviews run currency check, total check and then the
/// quick-save prompt. A completed batch asks how to continue. A save that has
/// reached the transaction store ends with the completion dialog. Kinds the
/// user already answered for the current results are skipped.
pub fn next_dialog(state: &ScanRequest, policy: &DialogPolicy) -> Option<Dialog> {
    if state.active_dialog.is_some() {
        return None;
    }
    let answered = |kind: DialogKind| state.resolved_dialogs.contains(&kind);

    match (state.mode, state.phase) {
        (Mode::Single | Mode::Statement, Phase::Reviewing) => {
            let tx = state.results.first()?;

            if !answered(DialogKind::CurrencyMismatch) {
                if let (Some(expected), Some(detected)) = (&policy.default_currency, &tx.currency) {
                    if !detected.eq_ignore_ascii_case(expected) {
                        return Some(Dialog::CurrencyMismatch {
                            detected: detected.clone(),
                            expected: expected.clone(),
                        });
                    }
                }
            }
            if !answered(DialogKind::TotalMismatch) && tx.has_total_mismatch() {
                return Some(Dialog::TotalMismatch {
                    extracted: tx.total,
                    computed: tx.line_item_total().unwrap_or(tx.total),
                });
            }
            if policy.quick_save && !answered(DialogKind::QuickSave) {
                return Some(Dialog::QuickSave {
                    transactions: state.results.len(),
                });
            }
            None
        }
        (Mode::Batch, Phase::Reviewing) if !answered(DialogKind::BatchComplete) => {
            let progress = state.batch_progress.unwrap_or_default();
            Some(Dialog::BatchComplete {
                completed: progress.completed,
                failed: progress.failed,
            })
        }
        (_, Phase::Saving) if policy.show_completion && !answered(DialogKind::ScanComplete) => {
            Some(Dialog::ScanComplete {
                saved: state.results.len(),
            })
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transaction::TimeStamp;

    fn reviewing(tx: Transaction) -> ScanRequest {
        ScanRequest {
            phase: Phase::Reviewing,
            results: vec![tx],
            started_at: Some(TimeStamp::new()),
            ..ScanRequest::idle()
        }
    }

    fn policy() -> DialogPolicy {
        DialogPolicy {
            default_currency: Some("USD".into()),
            quick_save: true,
            show_completion: true,
        }
    }

    #[test]
    fn chain_runs_currency_then_total_then_quick_save() {
        let tx = Transaction::new()
            .set_merchant("Acme")
            .set_currency("eur")
            .set_total(10)
            .add_line_item("widget", 1, 9);
        let mut state = reviewing(tx);

        let first = next_dialog(&state, &policy()).unwrap();
        assert_eq!(first.kind(), DialogKind::CurrencyMismatch);

        state.resolved_dialogs.push(DialogKind::CurrencyMismatch);
        let second = next_dialog(&state, &policy()).unwrap();
        assert_eq!(
            second,
            Dialog::TotalMismatch {
                extracted: 10,
                computed: 9
            }
        );

        state.resolved_dialogs.push(DialogKind::TotalMismatch);
        let third = next_dialog(&state, &policy()).unwrap();
        assert_eq!(third, Dialog::QuickSave { transactions: 1 });

        state.resolved_dialogs.push(DialogKind::QuickSave);
        assert_eq!(next_dialog(&state, &policy()), None);
    }

    #[test]
    fn matching_currency_skips_check() {
        let tx = Transaction::new().set_currency("usd").set_total(5);
        let state = reviewing(tx);
        let policy = DialogPolicy {
            quick_save: false,
            ..policy()
        };
        assert_eq!(next_dialog(&state, &policy), None);
    }

    #[test]
    fn use_line_items_rewrites_total() {
        let mut results = vec![Transaction::new().set_total(10).add_line_item("a", 1, 7)];
        let dialog = Dialog::TotalMismatch {
            extracted: 10,
            computed: 7,
        };
        let outcome = apply_resolution(
            &mut results,
            &dialog,
            &DialogResolution::TotalMismatch(TotalChoice::UseLineItems),
        );
        assert_eq!(outcome, Outcome::Return);
        assert_eq!(results[0].total, 7);
    }
}
