//! Staking and DataCoin event definitions.

use alloy::primitives::{Address, B256, U256};
use alloy::rpc::types::Log;
use alloy::sol;
use alloy::sol_types::SolEvent;
use anyhow::{Context, Result};
use poc_core::rewards::format_token_amount;
use poc_core::{TransactionKind, TransactionRecord, TransactionStatus};

sol! {
    /// StakingManager: learner escrowed ETH for a course.
    #[derive(Debug, PartialEq, Eq)]
    event Staked(address indexed user, uint256 indexed courseId, uint256 amount);

    /// StakingManager: course marked complete with its certificate.
    #[derive(Debug, PartialEq, Eq)]
    event CourseCompleted(address indexed user, uint256 indexed courseId, string certificateCID);

    /// StakingManager: stake returned to the learner.
    #[derive(Debug, PartialEq, Eq)]
    event StakeRefunded(address indexed user, uint256 indexed courseId, uint256 amount);

    /// DataCoin: reward tokens minted.
    #[derive(Debug, PartialEq, Eq)]
    event TokensMinted(address indexed to, uint256 amount, string reason);
}

/// Topic0 of every event the listener ingests.
pub const EVENT_SIGNATURES: [B256; 4] = [
    Staked::SIGNATURE_HASH,
    CourseCompleted::SIGNATURE_HASH,
    StakeRefunded::SIGNATURE_HASH,
    TokensMinted::SIGNATURE_HASH,
];

/// Decoded event payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChainEventKind {
    /// Stake deposited.
    Staked {
        /// Course id.
        course_id: U256,
        /// Wei staked.
        amount: U256,
    },
    /// Course completed.
    CourseCompleted {
        /// Course id.
        course_id: U256,
        /// Certificate CID.
        certificate_cid: String,
    },
    /// Stake refunded.
    StakeRefunded {
        /// Course id.
        course_id: U256,
        /// Wei refunded.
        amount: U256,
    },
    /// DataCoin minted.
    TokensMinted {
        /// Token base units minted.
        amount: U256,
        /// Mint reason.
        reason: String,
    },
}

/// Decoded event with block coordinates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainEvent {
    /// Learner the event belongs to
    pub user: Address,

    /// Event payload
    pub kind: ChainEventKind,

    /// Block number where the event occurred
    pub block_number: u64,

    /// Log index within the block
    pub log_index: u64,

    /// Transaction hash
    pub tx_hash: B256,
}

impl ChainEvent {
    /// Parse an event from an Alloy log, dispatching on topic0.
    pub fn from_log(log: &Log) -> Result<Self> {
        let signature = *log.topics().first().context("Log has no topics")?;

        let (user, kind) = if signature == Staked::SIGNATURE_HASH {
            let event = Staked::decode_log(log.as_ref(), true)
                .context("Failed to decode Staked event")?;
            (
                event.user,
                ChainEventKind::Staked {
                    course_id: event.courseId,
                    amount: event.amount,
                },
            )
        } else if signature == CourseCompleted::SIGNATURE_HASH {
            let event = CourseCompleted::decode_log(log.as_ref(), true)
                .context("Failed to decode CourseCompleted event")?;
            (
                event.user,
                ChainEventKind::CourseCompleted {
                    course_id: event.courseId,
                    certificate_cid: event.certificateCID.clone(),
                },
            )
        } else if signature == StakeRefunded::SIGNATURE_HASH {
            let event = StakeRefunded::decode_log(log.as_ref(), true)
                .context("Failed to decode StakeRefunded event")?;
            (
                event.user,
                ChainEventKind::StakeRefunded {
                    course_id: event.courseId,
                    amount: event.amount,
                },
            )
        } else if signature == TokensMinted::SIGNATURE_HASH {
            let event = TokensMinted::decode_log(log.as_ref(), true)
                .context("Failed to decode TokensMinted event")?;
            (
                event.to,
                ChainEventKind::TokensMinted {
                    amount: event.amount,
                    reason: event.reason.clone(),
                },
            )
        } else {
            anyhow::bail!("Unknown event signature {}", signature);
        };

        Ok(Self {
            user,
            kind,
            block_number: log.block_number.context("Log missing block_number")?,
            log_index: log.log_index.context("Log missing log_index")?,
            tx_hash: log
                .transaction_hash
                .context("Log missing transaction_hash")?,
        })
    }

    /// Convert to a dashboard transaction stamped with `timestamp`.
    pub fn to_transaction(&self, timestamp: i64) -> TransactionRecord {
        let (kind, amount, course_id, certificate_cid, reason) = match &self.kind {
            ChainEventKind::Staked { course_id, amount } => (
                TransactionKind::Stake,
                format_token_amount(*amount),
                course_id.to_string(),
                None,
                None,
            ),
            ChainEventKind::CourseCompleted {
                course_id,
                certificate_cid,
            } => (
                TransactionKind::Complete,
                "0".to_string(),
                course_id.to_string(),
                Some(certificate_cid.clone()).filter(|cid| !cid.is_empty()),
                None,
            ),
            ChainEventKind::StakeRefunded { course_id, amount } => (
                TransactionKind::Refund,
                format_token_amount(*amount),
                course_id.to_string(),
                None,
                None,
            ),
            ChainEventKind::TokensMinted { amount, reason } => (
                TransactionKind::Datacoin,
                format_token_amount(*amount),
                "0".to_string(),
                None,
                Some(reason.clone()),
            ),
        };

        TransactionRecord {
            hash: self.tx_hash.to_string(),
            kind,
            amount,
            course_id,
            timestamp,
            status: TransactionStatus::Success,
            block_number: Some(self.block_number),
            certificate_cid,
            reason,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::primitives::{LogData, U256};

    fn rpc_log(data: LogData, address: Address) -> Log {
        Log {
            inner: alloy::primitives::Log { address, data },
            block_number: Some(120),
            log_index: Some(3),
            transaction_hash: Some(B256::repeat_byte(0xaa)),
            ..Default::default()
        }
    }

    #[test]
    fn test_decode_staked_event() {
        let user = Address::repeat_byte(0x01);
        let event = Staked {
            user,
            courseId: U256::from(7),
            amount: U256::from(10_000_000_000_000_000u64),
        };
        let log = rpc_log(event.encode_log_data(), Address::repeat_byte(0x99));

        let parsed = ChainEvent::from_log(&log).unwrap();
        assert_eq!(parsed.user, user);
        assert_eq!(parsed.block_number, 120);

        let tx = parsed.to_transaction(1_700_000_000);
        assert_eq!(tx.kind, TransactionKind::Stake);
        assert_eq!(tx.amount, "0.01");
        assert_eq!(tx.course_id, "7");
        assert_eq!(tx.block_number, Some(120));
        assert_eq!(tx.hash, B256::repeat_byte(0xaa).to_string());
    }

    #[test]
    fn test_decode_completion_and_mint_events() {
        let user = Address::repeat_byte(0x02);

        let completed = CourseCompleted {
            user,
            courseId: U256::from(3),
            certificateCID: "bafkreiabc".to_string(),
        };
        let tx = ChainEvent::from_log(&rpc_log(completed.encode_log_data(), Address::ZERO))
            .unwrap()
            .to_transaction(10);
        assert_eq!(tx.kind, TransactionKind::Complete);
        assert_eq!(tx.amount, "0");
        assert_eq!(tx.certificate_cid.as_deref(), Some("bafkreiabc"));

        let minted = TokensMinted {
            to: user,
            amount: U256::from(3_000_000_000_000_000_000u64),
            reason: "course_progress".to_string(),
        };
        let tx = ChainEvent::from_log(&rpc_log(minted.encode_log_data(), Address::ZERO))
            .unwrap()
            .to_transaction(10);
        assert_eq!(tx.kind, TransactionKind::Datacoin);
        assert_eq!(tx.amount, "3.0");
        assert_eq!(tx.course_id, "0");
        assert_eq!(tx.reason.as_deref(), Some("course_progress"));
    }

    #[test]
    fn test_unknown_signature_is_rejected() {
        let data = LogData::new_unchecked(vec![B256::repeat_byte(0x42)], Default::default());
        assert!(ChainEvent::from_log(&rpc_log(data, Address::ZERO)).is_err());
    }
}
