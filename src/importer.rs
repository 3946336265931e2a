// 📦 Importer - state machine + batched upsert orchestration
//
// Two user-initiated flows, both sequential (one awaitless pass, one batch at
// a time): company import and monthly closing import. Store writes go out in
// fixed batches of 50 rows to bound request size and isolate failures: a
// failing batch is recorded as "Lote N: <msg>" and the remaining batches
// still proceed. Partial completion across batches is possible and accepted.

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::db::Store;
use crate::entities::MovementRecord;
use crate::parser::{parse_closing_sheet, parse_company_sheet, ClosingPreview};
use crate::resolver::resolve_references;

/// Rows per upsert call.
pub const BATCH_SIZE: usize = 50;

// ============================================================================
// IMPORT STATE MACHINE
// ============================================================================

/// Import lifecycle. Failures surface as explicit state transitions, never
/// as exceptions escaping to a crash.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ImportStatus {
    Idle,
    Parsing,
    Confirming,
    Importing,
    Done,
    Error,
}

impl ImportStatus {
    /// Transition table:
    /// idle -> parsing -> confirming -> importing -> done | error,
    /// parsing may fail straight to error, and done/error reset to idle.
    pub fn can_transition(self, next: ImportStatus) -> bool {
        use ImportStatus::*;
        matches!(
            (self, next),
            (Idle, Parsing)
                | (Parsing, Confirming)
                | (Parsing, Error)
                | (Confirming, Importing)
                | (Confirming, Idle)
                | (Importing, Done)
                | (Importing, Error)
                | (Done, Idle)
                | (Error, Idle)
        )
    }
}

/// Tracks the lifecycle of one import interaction and rejects transitions
/// outside the table. Fully decoupled from the parse/resolve/upsert logic,
/// which stays pure over explicit inputs.
#[derive(Debug)]
pub struct ImportSession {
    status: ImportStatus,
}

impl ImportSession {
    pub fn new() -> ImportSession {
        ImportSession {
            status: ImportStatus::Idle,
        }
    }

    pub fn status(&self) -> ImportStatus {
        self.status
    }

    pub fn transition(&mut self, next: ImportStatus) -> Result<()> {
        if !self.status.can_transition(next) {
            return Err(anyhow!(
                "Transição inválida: {:?} -> {:?}",
                self.status,
                next
            ));
        }
        self.status = next;
        Ok(())
    }
}

impl Default for ImportSession {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// IMPORT REPORT
// ============================================================================

/// Final result of an import run: rows written, rows dropped before writing
/// (missing identity fields or unmatched company), and per-batch errors.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImportReport {
    pub inserted: usize,
    pub skipped: usize,
    pub errors: Vec<String>,
}

impl ImportReport {
    pub fn ok(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Push rows to the store in fixed-size batches, collecting per-batch errors
/// without stopping the remaining batches.
pub fn upsert_in_batches<T>(
    rows: &[T],
    mut upsert: impl FnMut(&[T]) -> Result<usize>,
) -> (usize, Vec<String>) {
    let mut inserted = 0;
    let mut errors = Vec::new();
    for (i, batch) in rows.chunks(BATCH_SIZE).enumerate() {
        match upsert(batch) {
            Ok(written) => inserted += written,
            Err(e) => errors.push(format!("Lote {}: {}", i + 1, e)),
        }
    }
    (inserted, errors)
}

// ============================================================================
// IMPORT FLOWS
// ============================================================================

/// Company import: parse the export, resolve references (auto-creating
/// consultants and partners), upsert on produto_id in batches of 50.
pub fn run_company_import(store: &dyn Store, path: &Path) -> Result<ImportReport> {
    let outcome = parse_company_sheet(path)?;
    let records = resolve_references(store, &outcome.rows)?;
    let (inserted, errors) = upsert_in_batches(&records, |batch| store.upsert_companies(batch));
    Ok(ImportReport {
        inserted,
        skipped: outcome.skipped,
        errors,
    })
}

/// Monthly closing import: parse the sheet, resolve produto_id to empresa_id
/// (rows for unknown companies are dropped and counted), upsert on
/// (empresa_id, competencia) in batches of 50.
///
/// Returns the preview figures alongside the report so the driver can show
/// competence month and totals.
pub fn run_closing_import(store: &dyn Store, path: &Path) -> Result<(ClosingPreview, ImportReport)> {
    let outcome = parse_closing_sheet(path)?;
    let preview = ClosingPreview::of(&outcome);

    let ids: Vec<i64> = outcome.rows.iter().filter_map(|r| r.produto_id).collect();
    let empresa_map = store.companies_by_product_id(&ids)?;

    let mut unmatched = 0;
    let records: Vec<MovementRecord> = outcome
        .rows
        .iter()
        .filter_map(|r| {
            let produto_id = r.produto_id?;
            let competencia = r.competencia?;
            match empresa_map.get(&produto_id) {
                Some(empresa_id) => Some(MovementRecord {
                    empresa_id: *empresa_id,
                    competencia,
                    valor_movimentacao: r.vendas,
                    receita_taxa_positiva: r.taxa,
                    receita_total: r.taxa,
                }),
                None => {
                    unmatched += 1;
                    None
                }
            }
        })
        .collect();

    let (inserted, errors) = upsert_in_batches(&records, |batch| store.upsert_movements(batch));
    let report = ImportReport {
        inserted,
        skipped: outcome.skipped + unmatched,
        errors,
    };
    Ok((preview, report))
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use ImportStatus::*;

    #[test]
    fn test_transition_table_happy_path() {
        let mut session = ImportSession::new();
        for next in [Parsing, Confirming, Importing, Done, Idle] {
            session.transition(next).unwrap();
        }
        assert_eq!(session.status(), Idle);
    }

    #[test]
    fn test_transition_table_failure_paths() {
        let mut session = ImportSession::new();
        session.transition(Parsing).unwrap();
        session.transition(Error).unwrap();
        session.transition(Idle).unwrap();

        session.transition(Parsing).unwrap();
        session.transition(Confirming).unwrap();
        session.transition(Importing).unwrap();
        session.transition(Error).unwrap();
        assert_eq!(session.status(), Error);
    }

    #[test]
    fn test_invalid_transitions_rejected() {
        let mut session = ImportSession::new();
        assert!(session.transition(Done).is_err());
        assert!(session.transition(Importing).is_err());
        session.transition(Parsing).unwrap();
        assert!(session.transition(Importing).is_err());
        // Rejected transition leaves the state untouched
        assert_eq!(session.status(), Parsing);
    }

    #[test]
    fn test_cancel_from_confirming_resets() {
        let mut session = ImportSession::new();
        session.transition(Parsing).unwrap();
        session.transition(Confirming).unwrap();
        session.transition(Idle).unwrap();
        assert_eq!(session.status(), Idle);
    }

    #[test]
    fn test_batches_are_fixed_size() {
        let rows: Vec<u32> = (0..120).collect();
        let mut sizes = Vec::new();
        let (inserted, errors) = upsert_in_batches(&rows, |batch| {
            sizes.push(batch.len());
            Ok(batch.len())
        });
        assert_eq!(sizes, vec![50, 50, 20]);
        assert_eq!(inserted, 120);
        assert!(errors.is_empty());
    }

    #[test]
    fn test_failing_batch_does_not_stop_the_rest() {
        // 120 rows in batches of 50/50/20, batch 2 rejected: the 70 rows of
        // batches 1 and 3 are written, one tagged error.
        let rows: Vec<u32> = (0..120).collect();
        let mut call = 0;
        let (inserted, errors) = upsert_in_batches(&rows, |batch| {
            call += 1;
            if call == 2 {
                Err(anyhow!("violação de chave"))
            } else {
                Ok(batch.len())
            }
        });
        assert_eq!(inserted, 70);
        assert_eq!(errors, vec!["Lote 2: violação de chave".to_string()]);
    }
}
