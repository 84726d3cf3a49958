//! Per-item progress tracking for multi-receipt scans
//!
//! Items move `Pending -> Processing -> Done | Error` independently of one
//! another and completions may arrive in any order. The aggregate
//! [`BatchProgress`] is never stored as running counters: it is recomputed
//! from the receipts after every change, so it cannot drift.
use super::request::{BatchProgress, BatchReceipt, ReceiptStatus};
use super::transaction::Transaction;

pub fn progress_of(receipts: &[BatchReceipt]) -> BatchProgress {
    let mut progress = BatchProgress {
        total: receipts.len(),
        ..BatchProgress::default()
    };
    for receipt in receipts {
        match receipt.status {
            ReceiptStatus::Done => progress.completed += 1,
            ReceiptStatus::Error => progress.failed += 1,
            ReceiptStatus::Pending | ReceiptStatus::Processing => {}
        }
    }
    progress
}

/// A batch may complete once it has items and every one of them is terminal.
pub fn is_complete(receipts: &[BatchReceipt]) -> bool {
    !receipts.is_empty() && receipts.iter().all(|r| r.status.is_terminal())
}

/// Moves a pending (or previously failed) item into processing.
pub(crate) fn start_item(receipts: &mut [BatchReceipt], index: usize) -> bool {
    match receipts.get_mut(index) {
        Some(receipt)
            if matches!(receipt.status, ReceiptStatus::Pending | ReceiptStatus::Error) =>
        {
            receipt.status = ReceiptStatus::Processing;
            receipt.error = None;
            true
        }
        _ => false,
    }
}

pub(crate) fn succeed_item(
    receipts: &mut [BatchReceipt],
    index: usize,
    transaction: Transaction,
) -> bool {
    match receipts.get_mut(index) {
        Some(receipt) if receipt.status == ReceiptStatus::Processing => {
            receipt.status = ReceiptStatus::Done;
            receipt.result = Some(transaction);
            true
        }
        _ => false,
    }
}

pub(crate) fn fail_item(receipts: &mut [BatchReceipt], index: usize, message: String) -> bool {
    match receipts.get_mut(index) {
        Some(receipt) if receipt.status == ReceiptStatus::Processing => {
            receipt.status = ReceiptStatus::Error;
            receipt.error = Some(message);
            true
        }
        _ => false,
    }
}

/// Results of finished items, in submission order.
pub fn done_results(receipts: &[BatchReceipt]) -> Vec<Transaction> {
    receipts
        .iter()
        .filter(|r| r.status == ReceiptStatus::Done)
        .filter_map(|r| r.result.clone())
        .collect()
}

pub fn indices_with(receipts: &[BatchReceipt], status: ReceiptStatus) -> Vec<usize> {
    receipts
        .iter()
        .enumerate()
        .filter(|(_, r)| r.status == status)
        .map(|(index, _)| index)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn receipts(n: usize) -> Vec<BatchReceipt> {
        (0..n).map(|i| BatchReceipt::pending(&format!("img{i}"))).collect()
    }

    #[test]
    fn out_of_order_completion_aggregates_the_same() {
        let mut items = receipts(3);
        for i in 0..3 {
            assert!(start_item(&mut items, i));
        }
        assert!(succeed_item(&mut items, 2, Transaction::new().set_total(3)));
        assert!(fail_item(&mut items, 0, "blurry".into()));
        assert!(!is_complete(&items));
        assert!(succeed_item(&mut items, 1, Transaction::new().set_total(1)));

        assert_eq!(
            progress_of(&items),
            BatchProgress {
                completed: 2,
                total: 3,
                failed: 1
            }
        );
        assert!(is_complete(&items));
        let totals: Vec<i64> = done_results(&items).iter().map(|t| t.total).collect();
        assert_eq!(totals, vec![1, 3]);
    }

    #[test]
    fn terminal_items_ignore_late_updates() {
        let mut items = receipts(1);
        assert!(!succeed_item(&mut items, 0, Transaction::new()));
        assert!(start_item(&mut items, 0));
        assert!(succeed_item(&mut items, 0, Transaction::new()));
        assert!(!fail_item(&mut items, 0, "late".into()));
        assert!(!start_item(&mut items, 0));
        assert!(!start_item(&mut items, 7));
    }

    #[test]
    fn empty_batch_never_completes() {
        assert!(!is_complete(&[]));
    }
}
