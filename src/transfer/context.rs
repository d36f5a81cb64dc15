//! Transfer request and per-run context

use crate::chain::{GasType, Receipt};
use crate::config::EncryptionKey;
use crate::core_types::{Amount, TxHash, WalletId};
use crate::engine::{TransactionPayload, TransferParams, TransferProof, TransferRecipient};
use crate::workflow::StageContext;

/// What the caller wants sent
#[derive(Debug, Clone)]
pub struct TransferRequest {
    pub wallet_id: WalletId,
    pub encryption_key: EncryptionKey,
    pub recipients: Vec<TransferRecipient>,
    pub memo: Option<String>,
    pub show_sender_address_to_recipient: bool,
}

impl TransferRequest {
    /// One ERC-20 leg to one shielded recipient
    pub fn single(
        wallet_id: WalletId,
        encryption_key: EncryptionKey,
        token_address: impl Into<String>,
        amount: Amount,
        recipient_address: impl Into<String>,
    ) -> Self {
        Self {
            wallet_id,
            encryption_key,
            recipients: vec![TransferRecipient {
                token_address: token_address.into(),
                amount,
                recipient_address: recipient_address.into(),
            }],
            memo: None,
            show_sender_address_to_recipient: true,
        }
    }

    pub fn with_memo(mut self, memo: Option<String>) -> Self {
        self.memo = memo;
        self
    }

    /// Whether the recipient learns the sending 0zk address (shown by default)
    pub fn with_sender_address_shown(mut self, shown: bool) -> Self {
        self.show_sender_address_to_recipient = shown;
        self
    }

    pub(crate) fn into_params(self, network: &str) -> TransferParams {
        TransferParams {
            network: network.to_string(),
            wallet_id: self.wallet_id,
            encryption_key: self.encryption_key,
            memo: self.memo,
            recipients: self.recipients,
            show_sender_address_to_recipient: self.show_sender_address_to_recipient,
            // Self-signed: the configured account pays gas directly
            send_with_public_wallet: true,
        }
    }
}

/// Output of one transfer stage
#[derive(Debug, Clone)]
pub enum TransferOutput {
    GasEstimate {
        estimate: Amount,
        /// Batch minimum gas price from the placeholder gas details
        min_gas_price: Amount,
    },
    Proof(TransferProof),
    Payload(TransactionPayload),
    Broadcast(TxHash),
    Confirmed(Receipt),
}

/// Accumulated state of one transfer run
#[derive(Debug, Clone)]
pub struct TransferContext {
    pub params: TransferParams,
    /// Fee model, fixed for the whole run
    pub gas_type: GasType,
    pub gas_estimate: Option<Amount>,
    pub min_gas_price: Option<Amount>,
    pub proof: Option<TransferProof>,
    pub payload: Option<TransactionPayload>,
    pub tx_hash: Option<TxHash>,
    pub receipt: Option<Receipt>,
}

impl TransferContext {
    pub fn new(params: TransferParams, gas_type: GasType) -> Self {
        Self {
            params,
            gas_type,
            gas_estimate: None,
            min_gas_price: None,
            proof: None,
            payload: None,
            tx_hash: None,
            receipt: None,
        }
    }
}

impl StageContext for TransferContext {
    type Output = TransferOutput;

    fn merge(&mut self, output: TransferOutput) {
        match output {
            TransferOutput::GasEstimate {
                estimate,
                min_gas_price,
            } => {
                self.gas_estimate = Some(estimate);
                self.min_gas_price = Some(min_gas_price);
            }
            TransferOutput::Proof(proof) => self.proof = Some(proof),
            TransferOutput::Payload(payload) => self.payload = Some(payload),
            TransferOutput::Broadcast(hash) => self.tx_hash = Some(hash),
            TransferOutput::Confirmed(receipt) => self.receipt = Some(receipt),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn single() -> TransferRequest {
        TransferRequest::single(
            WalletId::from("w1"),
            EncryptionKey::from_passphrase_or_hex("pass"),
            "0xweth",
            Amount::from(1u32),
            "0zk1recipient",
        )
    }

    #[test]
    fn test_sender_address_shown_by_default() {
        let params = single().into_params("Ethereum");
        assert!(params.show_sender_address_to_recipient);
        assert!(params.send_with_public_wallet);
    }

    #[test]
    fn test_sender_address_can_be_hidden() {
        let params = single().with_sender_address_shown(false).into_params("Ethereum");
        assert!(!params.show_sender_address_to_recipient);
    }
}
