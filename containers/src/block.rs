use crate::{sha256d, HashDigest, Header, Transaction};
use serde::{Deserialize, Serialize};

/// A full block: header plus transactions.
#[derive(Clone, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Block {
    pub header: Header,
    pub transactions: Vec<Transaction>,
}

impl Block {
    pub fn new(header: Header, transactions: Vec<Transaction>) -> Self {
        Self {
            header,
            transactions,
        }
    }

    /// A block is identified by its header hash.
    pub fn hash(&self) -> HashDigest {
        self.header.hash()
    }

    /// Merkle root of the transaction hashes, duplicating the last hash of
    /// odd-sized rows. Zero for a block with no transactions.
    pub fn generate_merkle_root(&self) -> HashDigest {
        let mut row: Vec<HashDigest> = self.transactions.iter().map(Transaction::hash).collect();
        if row.is_empty() {
            return HashDigest::zero();
        }

        while row.len() > 1 {
            if row.len() % 2 != 0 {
                if let Some(last) = row.last().copied() {
                    row.push(last);
                }
            }

            row = row
                .chunks(2)
                .map(|pair| {
                    let mut concat = [0u8; 64];
                    concat[..32].copy_from_slice(pair[0].as_bytes());
                    concat[32..].copy_from_slice(pair[1].as_bytes());
                    sha256d(&concat)
                })
                .collect();
        }

        row[0]
    }

    /// Serialized size: header plus transactions.
    pub fn serialized_size(&self) -> usize {
        crate::header::HEADER_SIZE
            + self
                .transactions
                .iter()
                .map(|tx| tx.to_bytes().len())
                .sum::<usize>()
    }
}
