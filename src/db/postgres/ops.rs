use std::str::FromStr;

use async_trait::async_trait;
use bigdecimal::BigDecimal;
use log::error;

use crate::db::models::{BountyRecord, BountyStatus, PendingClaim, SyncCheckpoint, TransferRecord};
use crate::db::postgres::PostgresClient;
use crate::db::{ApplyOutcome, ClaimOutcome, EventStore};

/// Sanitize a string for PostgreSQL by removing null bytes (0x00)
/// which are invalid in UTF-8 text columns
fn sanitize_string(s: &str) -> String {
    s.replace('\0', "")
}

/// Parse an exact decimal stored as TEXT back into a BigDecimal.
fn parse_amount(column: &str, raw: &str) -> anyhow::Result<BigDecimal> {
    BigDecimal::from_str(raw)
        .map_err(|e| anyhow::anyhow!("Corrupt decimal in column {}: {:?} ({})", column, raw, e))
}

#[async_trait]
impl EventStore for PostgresClient {
    async fn upsert_transfer(&self, record: &TransferRecord) -> anyhow::Result<ApplyOutcome> {
        let client = self.pool.get().await?;
        let query = r#"
            INSERT INTO patron.transfers (
                chain_id, tx_hash, log_index, block_number,
                sender, recipient, amount, message, occurred_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            ON CONFLICT (tx_hash, log_index) DO NOTHING
        "#;

        let amount = record.amount.to_string();
        let message = record.message.as_deref().map(sanitize_string);

        let rows = client
            .execute(
                query,
                &[
                    &record.chain_id,
                    &record.tx_hash,
                    &record.log_index,
                    &record.block_number,
                    &record.sender,
                    &record.recipient,
                    &amount,
                    &message,
                    &record.occurred_at,
                ],
            )
            .await
            .map_err(|e| {
                error!("Failed to insert transfer {}: {:?}", record.tx_hash, e);
                e
            })?;

        Ok(if rows == 1 {
            ApplyOutcome::Applied
        } else {
            ApplyOutcome::AlreadyApplied
        })
    }

    async fn upsert_bounty_opened(&self, record: &BountyRecord) -> anyhow::Result<ApplyOutcome> {
        let client = self.pool.get().await?;
        let query = r#"
            INSERT INTO patron.bounties (
                chain_id, bounty_id, creator, title, description, amount,
                deadline, status, block_number, open_tx_hash, open_log_index, updated_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            ON CONFLICT (bounty_id) DO NOTHING
        "#;

        let amount = record.amount.to_string();
        let title = sanitize_string(&record.title);
        let description = sanitize_string(&record.description);

        let rows = client
            .execute(
                query,
                &[
                    &record.chain_id,
                    &record.bounty_id,
                    &record.creator,
                    &title,
                    &description,
                    &amount,
                    &record.deadline,
                    &record.status.as_str(),
                    &record.block_number,
                    &record.open_tx_hash,
                    &record.open_log_index,
                    &record.updated_at,
                ],
            )
            .await
            .map_err(|e| {
                error!("Failed to insert bounty {}: {:?}", record.bounty_id, e);
                e
            })?;

        Ok(if rows == 1 {
            ApplyOutcome::Applied
        } else {
            ApplyOutcome::AlreadyApplied
        })
    }

    async fn apply_bounty_claim(
        &self,
        bounty_id: &str,
        claimer: &str,
        content_uri: &str,
        tx_hash: &str,
        log_index: i64,
    ) -> anyhow::Result<ClaimOutcome> {
        let mut client = self.pool.get().await?;
        // Row lock + conditional update in one transaction so "record
        // written" and "checkpoint may advance" are never observed
        // inconsistently.
        let tx = client.transaction().await?;

        let row = tx
            .query_opt(
                "SELECT status FROM patron.bounties WHERE bounty_id = $1 FOR UPDATE",
                &[&bounty_id],
            )
            .await?;

        let Some(row) = row else {
            tx.commit().await?;
            return Ok(ClaimOutcome::NotFound);
        };

        let status: String = row.get("status");
        if status == BountyStatus::Claimed.as_str() {
            tx.commit().await?;
            return Ok(ClaimOutcome::AlreadyApplied);
        }

        tx.execute(
            r#"
            UPDATE patron.bounties SET
                status = 'claimed',
                claimer = $2,
                content_uri = $3,
                claim_tx_hash = $4,
                claim_log_index = $5,
                updated_at = NOW()
            WHERE bounty_id = $1
            "#,
            &[&bounty_id, &claimer, &content_uri, &tx_hash, &log_index],
        )
        .await
        .map_err(|e| {
            error!("Failed to apply claim for bounty {}: {:?}", bounty_id, e);
            e
        })?;

        tx.commit().await?;
        Ok(ClaimOutcome::Applied)
    }

    async fn get_sync_checkpoint(&self, chain_id: i64) -> anyhow::Result<Option<SyncCheckpoint>> {
        let client = self.pool.get().await?;
        let query = "SELECT chain_id, last_applied_block, updated_at FROM patron.sync_checkpoints WHERE chain_id = $1";

        let row = client.query_opt(query, &[&chain_id]).await?;

        Ok(row.map(|r| SyncCheckpoint {
            chain_id: r.get("chain_id"),
            last_applied_block: r.get("last_applied_block"),
            updated_at: r.get("updated_at"),
        }))
    }

    async fn set_sync_checkpoint(
        &self,
        chain_id: i64,
        last_applied_block: i64,
    ) -> anyhow::Result<()> {
        let client = self.pool.get().await?;
        // GREATEST keeps the checkpoint monotonic even if a stale writer
        // replays an old window.
        let query = r#"
            INSERT INTO patron.sync_checkpoints (chain_id, last_applied_block, updated_at)
            VALUES ($1, $2, NOW())
            ON CONFLICT (chain_id) DO UPDATE SET
                last_applied_block = GREATEST(patron.sync_checkpoints.last_applied_block, EXCLUDED.last_applied_block),
                updated_at = NOW()
        "#;

        client
            .execute(query, &[&chain_id, &last_applied_block])
            .await
            .map_err(|e| {
                error!(
                    "Failed to update sync checkpoint for chain {}: {:?}",
                    chain_id, e
                );
                e
            })?;

        Ok(())
    }

    async fn record_pending_claim(&self, claim: &PendingClaim) -> anyhow::Result<()> {
        let client = self.pool.get().await?;
        let query = r#"
            INSERT INTO patron.pending_claims (
                chain_id, bounty_id, claimer, content_uri,
                tx_hash, log_index, block_number, first_seen_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ON CONFLICT (tx_hash, log_index) DO NOTHING
        "#;

        client
            .execute(
                query,
                &[
                    &claim.chain_id,
                    &claim.bounty_id,
                    &claim.claimer,
                    &claim.content_uri,
                    &claim.tx_hash,
                    &claim.log_index,
                    &claim.block_number,
                    &claim.first_seen_at,
                ],
            )
            .await
            .map_err(|e| {
                error!(
                    "Failed to record pending claim for bounty {}: {:?}",
                    claim.bounty_id, e
                );
                e
            })?;

        Ok(())
    }

    async fn pending_claims(&self, chain_id: i64) -> anyhow::Result<Vec<PendingClaim>> {
        let client = self.pool.get().await?;
        let query = r#"
            SELECT chain_id, bounty_id, claimer, content_uri,
                   tx_hash, log_index, block_number, first_seen_at
            FROM patron.pending_claims
            WHERE chain_id = $1
            ORDER BY block_number, log_index
        "#;

        let rows = client.query(query, &[&chain_id]).await?;
        let claims = rows
            .iter()
            .map(|row| PendingClaim {
                chain_id: row.get("chain_id"),
                bounty_id: row.get("bounty_id"),
                claimer: row.get("claimer"),
                content_uri: row.get("content_uri"),
                tx_hash: row.get("tx_hash"),
                log_index: row.get("log_index"),
                block_number: row.get("block_number"),
                first_seen_at: row.get("first_seen_at"),
            })
            .collect();

        Ok(claims)
    }

    async fn resolve_pending_claim(&self, tx_hash: &str, log_index: i64) -> anyhow::Result<()> {
        let client = self.pool.get().await?;
        client
            .execute(
                "DELETE FROM patron.pending_claims WHERE tx_hash = $1 AND log_index = $2",
                &[&tx_hash, &log_index],
            )
            .await?;
        Ok(())
    }
}

impl PostgresClient {
    /// Fetch a single transfer projection by its idempotency key.
    pub async fn get_transfer(
        &self,
        tx_hash: &str,
        log_index: i64,
    ) -> anyhow::Result<Option<TransferRecord>> {
        let client = self.pool.get().await?;
        let query = r#"
            SELECT chain_id, tx_hash, log_index, block_number,
                   sender, recipient, amount, message, occurred_at
            FROM patron.transfers
            WHERE tx_hash = $1 AND log_index = $2
        "#;

        let row = client.query_opt(query, &[&tx_hash, &log_index]).await?;
        row.map(|r| row_to_transfer(&r)).transpose()
    }

    /// Fetch transfers received by an address, newest first.
    pub async fn get_transfers_for_recipient(
        &self,
        chain_id: i64,
        recipient: &str,
        limit: i64,
    ) -> anyhow::Result<Vec<TransferRecord>> {
        let client = self.pool.get().await?;
        let query = r#"
            SELECT chain_id, tx_hash, log_index, block_number,
                   sender, recipient, amount, message, occurred_at
            FROM patron.transfers
            WHERE chain_id = $1 AND recipient = $2
            ORDER BY block_number DESC, log_index DESC
            LIMIT $3
        "#;

        let rows = client
            .query(query, &[&chain_id, &recipient, &limit])
            .await?;
        rows.iter().map(row_to_transfer).collect()
    }

    /// Fetch a single bounty projection.
    pub async fn get_bounty(&self, bounty_id: &str) -> anyhow::Result<Option<BountyRecord>> {
        let client = self.pool.get().await?;
        let query = r#"
            SELECT chain_id, bounty_id, creator, title, description, amount,
                   deadline, status, claimer, content_uri, block_number,
                   open_tx_hash, open_log_index, claim_tx_hash, claim_log_index, updated_at
            FROM patron.bounties
            WHERE bounty_id = $1
        "#;

        let row = client.query_opt(query, &[&bounty_id]).await?;
        row.map(|r| row_to_bounty(&r)).transpose()
    }

    /// Fetch all bounties in a given state, newest first.
    pub async fn get_bounties_by_status(
        &self,
        chain_id: i64,
        status: BountyStatus,
    ) -> anyhow::Result<Vec<BountyRecord>> {
        let client = self.pool.get().await?;
        let query = r#"
            SELECT chain_id, bounty_id, creator, title, description, amount,
                   deadline, status, claimer, content_uri, block_number,
                   open_tx_hash, open_log_index, claim_tx_hash, claim_log_index, updated_at
            FROM patron.bounties
            WHERE chain_id = $1 AND status = $2
            ORDER BY block_number DESC
        "#;

        let rows = client.query(query, &[&chain_id, &status.as_str()]).await?;
        rows.iter().map(row_to_bounty).collect()
    }
}

fn row_to_transfer(row: &tokio_postgres::Row) -> anyhow::Result<TransferRecord> {
    let amount: String = row.get("amount");
    Ok(TransferRecord {
        chain_id: row.get("chain_id"),
        tx_hash: row.get("tx_hash"),
        log_index: row.get("log_index"),
        block_number: row.get("block_number"),
        sender: row.get("sender"),
        recipient: row.get("recipient"),
        amount: parse_amount("transfers.amount", &amount)?,
        message: row.get("message"),
        occurred_at: row.get("occurred_at"),
    })
}

fn row_to_bounty(row: &tokio_postgres::Row) -> anyhow::Result<BountyRecord> {
    let amount: String = row.get("amount");
    let status: String = row.get("status");
    Ok(BountyRecord {
        chain_id: row.get("chain_id"),
        bounty_id: row.get("bounty_id"),
        creator: row.get("creator"),
        title: row.get("title"),
        description: row.get("description"),
        amount: parse_amount("bounties.amount", &amount)?,
        deadline: row.get("deadline"),
        status: BountyStatus::parse(&status)
            .ok_or_else(|| anyhow::anyhow!("Unknown bounty status {:?}", status))?,
        claimer: row.get("claimer"),
        content_uri: row.get("content_uri"),
        block_number: row.get("block_number"),
        open_tx_hash: row.get("open_tx_hash"),
        open_log_index: row.get("open_log_index"),
        claim_tx_hash: row.get("claim_tx_hash"),
        claim_log_index: row.get("claim_log_index"),
        updated_at: row.get("updated_at"),
    })
}
