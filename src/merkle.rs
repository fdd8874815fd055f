use super::*;

/// Merkle tree over a block's transactions with the coinbase slot left open.
///
/// Only the `steps` are kept: the sibling hashes on the path from leaf zero to
/// the root. Folding a coinbase hash through them yields the merkle root
/// without touching any other transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MerkleTree {
    steps: Vec<[u8; 32]>,
}

impl MerkleTree {
    /// Builds the tree from the non-coinbase transaction hashes in internal
    /// byte order. Leaf zero is implied.
    pub fn new(hashes: &[[u8; 32]]) -> Self {
        let mut steps = Vec::new();
        let mut level = hashes.to_vec();

        while !level.is_empty() {
            steps.push(level[0]);

            // the open slot makes the real level one longer than `level`
            if level.len() % 2 == 0 {
                level.push(level[level.len() - 1]);
            }

            level = level[1..]
                .chunks_exact(2)
                .map(|pair| join(&pair[0], &pair[1]))
                .collect();
        }

        Self { steps }
    }

    /// Parses display-order transaction ids as returned by the node.
    pub fn from_txids<'a>(txids: impl IntoIterator<Item = &'a str>) -> Result<Self> {
        let hashes = txids
            .into_iter()
            .map(|txid| {
                let mut hash = util::decode_hash(txid)?;
                hash.reverse();
                Ok(hash)
            })
            .collect::<Result<Vec<[u8; 32]>>>()?;

        Ok(Self::new(&hashes))
    }

    pub fn steps(&self) -> &[[u8; 32]] {
        &self.steps
    }

    pub fn branch(&self) -> Vec<String> {
        self.steps.iter().map(hex::encode).collect()
    }

    pub fn with_first(&self, first: [u8; 32]) -> [u8; 32] {
        self.steps.iter().fold(first, |acc, step| join(&acc, step))
    }
}

fn join(left: &[u8; 32], right: &[u8; 32]) -> [u8; 32] {
    let mut concat = [0u8; 64];
    concat[..32].copy_from_slice(left);
    concat[32..].copy_from_slice(right);
    util::sha256d(&concat)
}
