//! Context-free transaction checks
//!
//! These only look at the transaction itself; anything needing the UTXO
//! set or the chain tip is out of reach here.

use crate::consensus::params::ConsensusParameters;
use crate::consensus::validation::{reasons, Rejection};
use crate::core::Transaction;
use std::collections::HashSet;

/// Allowed coinbase signature script length, inclusive
const COINBASE_SCRIPT_LENGTH: std::ops::RangeInclusive<usize> = 2..=100;

fn money_range(value: i64, params: &ConsensusParameters) -> bool {
    (0..=params.max_money).contains(&value)
}

/// Run all checks; the first failure wins
pub fn check_transaction(tx: &Transaction, params: &ConsensusParameters) -> Result<(), Rejection> {
    if tx.inputs.is_empty() {
        return Err(Rejection::consensus(reasons::BAD_TXNS_VIN_EMPTY, ""));
    }
    if tx.outputs.is_empty() {
        return Err(Rejection::consensus(reasons::BAD_TXNS_VOUT_EMPTY, ""));
    }

    let size = tx.size_without_witness() as u64;
    if size.saturating_mul(params.witness_scale_factor) > params.max_block_weight {
        return Err(Rejection::consensus(
            reasons::BAD_TXNS_OVERSIZE,
            format!("size {} exceeds block weight", size),
        ));
    }

    check_outputs(tx, params)?;

    let mut spent = HashSet::with_capacity(tx.inputs.len());
    for input in &tx.inputs {
        if !spent.insert(input.previous_output) {
            return Err(Rejection::consensus(
                reasons::BAD_TXNS_INPUTS_DUPLICATE,
                format!(
                    "{}:{} spent twice",
                    input.previous_output.hash, input.previous_output.index
                ),
            ));
        }
    }

    if tx.is_coinbase() {
        let length = tx.inputs[0].signature_script.len();
        if !COINBASE_SCRIPT_LENGTH.contains(&length) {
            return Err(Rejection::consensus(
                reasons::BAD_CB_LENGTH,
                format!("coinbase script is {} bytes", length),
            ));
        }
    } else if tx.inputs.iter().any(|input| input.previous_output.is_null()) {
        return Err(Rejection::consensus(reasons::BAD_TXNS_PREVOUT_NULL, ""));
    }

    Ok(())
}

fn check_outputs(tx: &Transaction, params: &ConsensusParameters) -> Result<(), Rejection> {
    let mut total: i64 = 0;
    for (index, output) in tx.outputs.iter().enumerate() {
        if output.value < 0 {
            return Err(Rejection::consensus(
                reasons::BAD_TXNS_VOUT_NEGATIVE,
                format!("output {} has value {}", index, output.value),
            ));
        }
        if output.value > params.max_money {
            return Err(Rejection::consensus(
                reasons::BAD_TXNS_VOUT_TOOLARGE,
                format!("output {} has value {}", index, output.value),
            ));
        }
        total = total
            .checked_add(output.value)
            .filter(|sum| money_range(*sum, params))
            .ok_or_else(|| {
                Rejection::consensus(
                    reasons::BAD_TXNS_TXOUTTOTAL_TOOLARGE,
                    format!("total exceeds {} at output {}", params.max_money, index),
                )
            })?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{OutPoint, TransactionInput, TransactionOutput, UInt256};
    use crate::crypto::DoubleSha256;

    fn params() -> ConsensusParameters {
        ConsensusParameters::regtest()
    }

    fn spend(inputs: Vec<TransactionInput>, values: &[i64]) -> Transaction {
        let outputs = values
            .iter()
            .map(|value| TransactionOutput::new(*value, vec![0x51]))
            .collect();
        Transaction::new(1, inputs, outputs, 0, &DoubleSha256)
    }

    fn input(n: u64) -> TransactionInput {
        TransactionInput::new(OutPoint::new(UInt256::from_u64(n), 0), vec![])
    }

    fn reason(tx: &Transaction) -> Option<&'static str> {
        check_transaction(tx, &params()).err().map(|r| r.reason)
    }

    #[test]
    fn test_valid_transaction() {
        assert_eq!(reason(&spend(vec![input(1), input(2)], &[10, 20])), None);
    }

    #[test]
    fn test_empty_inputs_and_outputs() {
        assert_eq!(reason(&spend(vec![], &[1])), Some(reasons::BAD_TXNS_VIN_EMPTY));
        assert_eq!(reason(&spend(vec![input(1)], &[])), Some(reasons::BAD_TXNS_VOUT_EMPTY));
    }

    #[test]
    fn test_negative_output() {
        assert_eq!(
            reason(&spend(vec![input(1)], &[-1])),
            Some(reasons::BAD_TXNS_VOUT_NEGATIVE)
        );
    }

    #[test]
    fn test_output_above_max_money() {
        let max = params().max_money;
        assert_eq!(
            reason(&spend(vec![input(1)], &[max + 1])),
            Some(reasons::BAD_TXNS_VOUT_TOOLARGE)
        );
    }

    #[test]
    fn test_output_total_overflow() {
        let max = params().max_money;
        assert_eq!(
            reason(&spend(vec![input(1)], &[max, max])),
            Some(reasons::BAD_TXNS_TXOUTTOTAL_TOOLARGE)
        );
        assert_eq!(
            reason(&spend(vec![input(1)], &[max, 1])),
            Some(reasons::BAD_TXNS_TXOUTTOTAL_TOOLARGE)
        );
    }

    #[test]
    fn test_duplicate_inputs() {
        assert_eq!(
            reason(&spend(vec![input(1), input(1)], &[1])),
            Some(reasons::BAD_TXNS_INPUTS_DUPLICATE)
        );
    }

    #[test]
    fn test_null_prevout_outside_coinbase() {
        let null = TransactionInput::new(OutPoint::NULL, vec![]);
        assert_eq!(
            reason(&spend(vec![input(1), null], &[1])),
            Some(reasons::BAD_TXNS_PREVOUT_NULL)
        );
    }

    #[test]
    fn test_coinbase_script_length() {
        let short = spend(vec![TransactionInput::coinbase(vec![0x01])], &[50]);
        let long = spend(vec![TransactionInput::coinbase(vec![0x01; 101])], &[50]);
        let ok = spend(vec![TransactionInput::coinbase(vec![0x01; 100])], &[50]);

        assert_eq!(reason(&short), Some(reasons::BAD_CB_LENGTH));
        assert_eq!(reason(&long), Some(reasons::BAD_CB_LENGTH));
        assert_eq!(reason(&ok), None);
    }

    #[test]
    fn test_oversize() {
        let script = vec![0u8; 1_000_001];
        let tx = Transaction::new(
            1,
            vec![input(1)],
            vec![TransactionOutput::new(1, script)],
            0,
            &DoubleSha256,
        );
        assert_eq!(reason(&tx), Some(reasons::BAD_TXNS_OVERSIZE));
    }
}
