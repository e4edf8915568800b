use std::collections::HashMap;

use chrono::{NaiveDate, Utc};
use uuid::Uuid;

use crate::error::{AppError, AppResult, ReconciliationError};
use crate::reconciliation::models::{Discrepancy, Reconciliation, ReconciliationStatus};

/// Store for reconciliations and their discrepancies. The per-date
/// existence guard lives here so duplicate scheduling cannot create two
/// records for the same day.
pub struct ReconciliationRepository {
    reconciliations: tokio::sync::RwLock<HashMap<Uuid, Reconciliation>>,
    discrepancies: tokio::sync::RwLock<HashMap<Uuid, Discrepancy>>,
}

impl ReconciliationRepository {
    pub fn new() -> Self {
        Self {
            reconciliations: tokio::sync::RwLock::new(HashMap::new()),
            discrepancies: tokio::sync::RwLock::new(HashMap::new()),
        }
    }

    /// Inserts unless a reconciliation already exists for the date.
    pub async fn create_guarded(&self, reconciliation: Reconciliation) -> AppResult<Reconciliation> {
        let mut recs = self.reconciliations.write().await;
        if recs.values().any(|r| r.recon_date == reconciliation.recon_date) {
            return Err(ReconciliationError::AlreadyReconciled(reconciliation.recon_date).into());
        }
        recs.insert(reconciliation.id, reconciliation.clone());
        Ok(reconciliation)
    }

    pub async fn get(&self, id: Uuid) -> AppResult<Reconciliation> {
        let recs = self.reconciliations.read().await;
        recs.get(&id)
            .cloned()
            .ok_or_else(|| AppError::NotFound(format!("Reconciliation {} not found", id)))
    }

    pub async fn find_by_date(&self, date: NaiveDate) -> Option<Reconciliation> {
        let recs = self.reconciliations.read().await;
        recs.values().find(|r| r.recon_date == date).cloned()
    }

    pub async fn list(&self) -> AppResult<Vec<Reconciliation>> {
        let recs = self.reconciliations.read().await;
        let mut all: Vec<Reconciliation> = recs.values().cloned().collect();
        all.sort_by(|a, b| b.recon_date.cmp(&a.recon_date));
        Ok(all)
    }

    pub async fn set_status(&self, id: Uuid, status: ReconciliationStatus) -> AppResult<Reconciliation> {
        let mut recs = self.reconciliations.write().await;
        let rec = recs
            .get_mut(&id)
            .ok_or_else(|| AppError::NotFound(format!("Reconciliation {} not found", id)))?;

        rec.status = status;
        if status == ReconciliationStatus::Completed {
            rec.completed_at = Some(Utc::now());
        }

        Ok(rec.clone())
    }

    pub async fn create_discrepancy(&self, discrepancy: Discrepancy) -> AppResult<Discrepancy> {
        let mut discs = self.discrepancies.write().await;
        discs.insert(discrepancy.id, discrepancy.clone());
        Ok(discrepancy)
    }

    pub async fn list_discrepancies(&self, reconciliation_id: Uuid) -> AppResult<Vec<Discrepancy>> {
        let discs = self.discrepancies.read().await;
        let mut matching: Vec<Discrepancy> = discs
            .values()
            .filter(|d| d.reconciliation_id == reconciliation_id)
            .cloned()
            .collect();
        matching.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(matching)
    }

    /// Single-shot resolution; a second attempt is rejected inside the
    /// write lock, so concurrent operators cannot both close it.
    pub async fn resolve_discrepancy(
        &self,
        id: Uuid,
        resolution: String,
        notes: Option<String>,
        resolved_by: String,
    ) -> AppResult<Discrepancy> {
        let mut discs = self.discrepancies.write().await;
        let disc = discs
            .get_mut(&id)
            .ok_or_else(|| AppError::NotFound(format!("Discrepancy {} not found", id)))?;

        if disc.resolved {
            return Err(ReconciliationError::AlreadyResolved.into());
        }

        disc.resolved = true;
        disc.resolution = Some(resolution);
        disc.notes = notes;
        disc.resolved_by = Some(resolved_by);
        disc.resolved_at = Some(Utc::now());

        Ok(disc.clone())
    }
}
