//! The ledger state machine.
//!
//! State is a fold over the append-only block log: balances and per-account
//! nonces are rebuildable caches, the log is the sole durable source of
//! truth. The fold itself ([`apply_tx_to`]) is a pure function over the two
//! maps so replay can be tested without any file I/O.
//!
//! Block application is all-or-nothing: transactions are staged onto a
//! scratch copy of the maps and committed only when every one of them
//! succeeds, and the in-memory head advances only after the durable append
//! has been flushed.

use crate::block::{Block, BlockRecord, Hash};
use crate::error::{ChainError, Result};
use crate::genesis::{self, Genesis};
use crate::transaction::{Account, Tx};
use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use tracing::info;

pub struct State {
    balances: HashMap<Account, u64>,
    /// Last used nonce per account; the expected next nonce is this plus one.
    account_nonces: HashMap<Account, u64>,
    latest_block_hash: Hash,
    latest_block_number: u64,
    has_blocks: bool,
    db_file: File,
    db_path: PathBuf,
}

impl State {
    /// Provisions the data directory if needed, loads genesis balances, and
    /// replays every log record in file order. Any record that fails to
    /// decode, does not match its stored hash, does not extend the previous
    /// record, or contains an invalid transaction makes the whole load fail:
    /// the node refuses to run on a ledger it cannot trust.
    pub fn load_from_disk(data_dir: &Path) -> Result<Self> {
        genesis::init_data_dir(data_dir)?;
        let genesis = Genesis::load(&genesis::genesis_path(data_dir))?;

        let db_path = genesis::blocks_db_path(data_dir);
        let db_file = OpenOptions::new().read(true).append(true).open(&db_path)?;

        let mut balances = genesis.balances;
        let mut account_nonces = HashMap::new();
        let mut latest_block_hash = Hash::zero();
        let mut latest_block_number = 0u64;
        let mut has_blocks = false;

        let reader = BufReader::new(&db_file);
        for (idx, line) in reader.lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }

            let record: BlockRecord = serde_json::from_str(&line).map_err(|e| {
                ChainError::Corruption(format!("block log line {}: {}", idx + 1, e))
            })?;

            let computed = record.value.hash()?;
            if computed != record.key {
                return Err(ChainError::Corruption(format!(
                    "block log line {}: stored hash {} does not match computed {}",
                    idx + 1,
                    record.key,
                    computed
                )));
            }
            if record.value.header.parent != latest_block_hash {
                return Err(ChainError::Corruption(format!(
                    "block log line {}: parent {} does not extend head {}",
                    idx + 1,
                    record.value.header.parent,
                    latest_block_hash
                )));
            }

            apply_block_txs(&mut balances, &mut account_nonces, &record.value).map_err(|e| {
                ChainError::Corruption(format!("block log line {}: {}", idx + 1, e))
            })?;

            latest_block_hash = record.key;
            latest_block_number = record.value.header.number;
            has_blocks = true;
        }

        Ok(State {
            balances,
            account_nonces,
            latest_block_hash,
            latest_block_number,
            has_blocks,
            db_file,
            db_path,
        })
    }

    /// Applies a single transaction to the live maps. Reward transactions
    /// mint unconditionally; transfers enforce balance and nonce rules.
    pub fn apply_tx(&mut self, tx: &Tx) -> Result<()> {
        apply_tx_to(&mut self.balances, &mut self.account_nonces, tx)
    }

    /// Applies every transaction in order, all-or-nothing. A failure anywhere
    /// leaves balances and nonces untouched.
    pub fn apply_block(&mut self, block: &Block) -> Result<()> {
        let (balances, account_nonces) = self.stage_block(block)?;
        self.balances = balances;
        self.account_nonces = account_nonces;
        Ok(())
    }

    /// Validates the block against the current head, persists it, and commits
    /// the staged state. The in-memory head advances only after the record
    /// has been durably appended, so a crash mid-way leaves both the log and
    /// the maps at "block not yet accepted".
    pub fn add_block(&mut self, block: Block) -> Result<Hash> {
        if block.header.parent != self.latest_block_hash {
            return Err(ChainError::ParentMismatch {
                parent: block.header.parent,
                head: self.latest_block_hash,
            });
        }

        let (balances, account_nonces) = self.stage_block(&block)?;

        let hash = block.hash()?;
        let number = block.header.number;
        let record = BlockRecord {
            key: hash,
            value: block,
        };
        let mut line = serde_json::to_vec(&record)?;
        line.push(b'\n');
        self.db_file.write_all(&line)?;
        self.db_file.sync_data()?;

        self.balances = balances;
        self.account_nonces = account_nonces;
        self.latest_block_hash = hash;
        self.latest_block_number = number;
        self.has_blocks = true;

        info!(block = %hash, number, txs = record.value.txs.len(), "persisted new block");
        Ok(hash)
    }

    fn stage_block(&self, block: &Block) -> Result<(HashMap<Account, u64>, HashMap<Account, u64>)> {
        let mut balances = self.balances.clone();
        let mut account_nonces = self.account_nonces.clone();
        apply_block_txs(&mut balances, &mut account_nonces, block)?;
        Ok((balances, account_nonces))
    }

    pub fn balances(&self) -> &HashMap<Account, u64> {
        &self.balances
    }

    pub fn balance_of(&self, account: &Account) -> u64 {
        self.balances.get(account).copied().unwrap_or(0)
    }

    /// Expected nonce for the account's next transfer: last used plus one,
    /// so a fresh account's first transfer carries nonce 1.
    pub fn next_account_nonce(&self, account: &Account) -> u64 {
        self.account_nonces.get(account).copied().unwrap_or(0) + 1
    }

    pub fn latest_block_hash(&self) -> Hash {
        self.latest_block_hash
    }

    pub fn latest_block_number(&self) -> u64 {
        self.latest_block_number
    }

    /// Number the next block should carry: 0 while the log is empty.
    pub fn next_block_number(&self) -> u64 {
        if self.has_blocks {
            self.latest_block_number + 1
        } else {
            0
        }
    }

    /// Blocks recorded after the given hash, in chain order; the zero hash
    /// returns the whole chain. Re-reads the log so callers (the sync serving
    /// side) see exactly what is durable.
    pub fn blocks_after(&self, from: Hash) -> Result<Vec<Block>> {
        let file = File::open(&self.db_path)?;
        let reader = BufReader::new(file);

        let mut collecting = from.is_zero();
        let mut blocks = Vec::new();
        for line in reader.lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let record: BlockRecord = serde_json::from_str(&line)
                .map_err(|e| ChainError::Corruption(format!("block log: {}", e)))?;
            if collecting {
                blocks.push(record.value);
            } else if record.key == from {
                collecting = true;
            }
        }
        Ok(blocks)
    }

    /// Flushes the log handle. Dropping the state closes it.
    pub fn close(&mut self) {
        let _ = self.db_file.sync_data();
    }
}

/// The pure fold step shared by replay and live application.
fn apply_tx_to(
    balances: &mut HashMap<Account, u64>,
    account_nonces: &mut HashMap<Account, u64>,
    tx: &Tx,
) -> Result<()> {
    if tx.is_reward() {
        let balance = balances.entry(tx.to).or_insert(0);
        *balance = balance
            .checked_add(tx.value)
            .ok_or(ChainError::BalanceOverflow { account: tx.to })?;
        return Ok(());
    }

    let expected = account_nonces.get(&tx.from).copied().unwrap_or(0) + 1;
    if tx.nonce != expected {
        return Err(ChainError::InvalidNonce {
            account: tx.from,
            expected,
            got: tx.nonce,
        });
    }

    let balance = balances.get(&tx.from).copied().unwrap_or(0);
    if tx.value > balance {
        return Err(ChainError::InsufficientBalance {
            from: tx.from,
            balance,
            value: tx.value,
        });
    }

    // Checked before the debit so a failing transfer mutates nothing. A
    // self-transfer cannot overflow: its value is bounded by its own balance.
    if tx.from != tx.to {
        let recipient = balances.get(&tx.to).copied().unwrap_or(0);
        if recipient.checked_add(tx.value).is_none() {
            return Err(ChainError::BalanceOverflow { account: tx.to });
        }
    }

    *balances.entry(tx.from).or_insert(0) -= tx.value;
    *balances.entry(tx.to).or_insert(0) += tx.value;
    account_nonces.insert(tx.from, tx.nonce);
    Ok(())
}

fn apply_block_txs(
    balances: &mut HashMap<Account, u64>,
    account_nonces: &mut HashMap<Account, u64>,
    block: &Block,
) -> Result<()> {
    for stx in &block.txs {
        apply_tx_to(balances, account_nonces, &stx.tx)?;
    }
    Ok(())
}
