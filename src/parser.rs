// 📥 Row Parser - spreadsheet rows to typed candidate records
//
// Two import variants share this module:
// - company import ("Importar Empresas"): the full registration export
// - monthly closing ("Fechamento Mensal"): sales and fee figures per company
//
// Column order is free; headers are matched through the normalizer's fuzzy
// lookup (exact, then fold-insensitive, then substring for the competence
// column). Parsing never throws per-row: fields that fail to resolve take
// their normalizer's empty value, and rows lacking the identity fields are
// dropped and counted.

use anyhow::{Context, Result};
use calamine::{open_workbook_auto, Data, Reader};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::normalizer::{
    clean_competence, clean_date, clean_int, clean_number, clean_percent, clean_text, find_key,
    find_key_contains,
};

// ============================================================================
// RAW SHEET ACCESS
// ============================================================================

/// One spreadsheet row as (header, cell) pairs, in sheet order.
#[derive(Debug, Clone)]
pub struct RawRow {
    pub cells: Vec<(String, Data)>,
}

impl RawRow {
    /// Cell by header: exact match, then fold-insensitive match.
    pub fn key(&self, target: &str) -> Option<&Data> {
        find_key(&self.cells, target)
    }

    /// Cell by header, trying each variant in order. Lets the accented
    /// spelling win over the plain one when both are declared.
    pub fn key_any(&self, targets: &[&str]) -> Option<&Data> {
        targets.iter().find_map(|t| self.key(t))
    }

    /// Cell whose header contains the folded fragment.
    pub fn key_contains(&self, fragment: &str) -> Option<&Data> {
        find_key_contains(&self.cells, fragment)
    }
}

/// Read the first sheet of an .xlsx/.xls file, first row as header.
pub fn read_rows(path: &Path) -> Result<Vec<RawRow>> {
    let mut workbook = open_workbook_auto(path)
        .with_context(|| format!("Erro ao ler o arquivo: {}", path.display()))?;

    let sheet_name = workbook
        .sheet_names()
        .first()
        .context("A planilha não tem abas")?
        .clone();

    let range = workbook
        .worksheet_range(&sheet_name)
        .with_context(|| format!("Erro ao ler a aba: {}", sheet_name))?;

    let mut rows = range.rows();
    let headers: Vec<String> = match rows.next() {
        Some(header_row) => header_row
            .iter()
            .map(|c| match c {
                Data::String(s) => s.trim().to_string(),
                other => other.to_string().trim().to_string(),
            })
            .collect(),
        None => return Ok(Vec::new()),
    };

    let mut out = Vec::new();
    for row in rows {
        if row.iter().all(|c| matches!(c, Data::Empty)) {
            continue;
        }
        let cells = headers
            .iter()
            .cloned()
            .zip(row.iter().cloned())
            .filter(|(h, _)| !h.is_empty())
            .collect();
        out.push(RawRow { cells });
    }
    Ok(out)
}

// ============================================================================
// PARSE OUTCOME
// ============================================================================

/// Valid candidates plus the count of rows dropped for missing identity
/// fields. The skipped count is surfaced all the way to the import report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParseOutcome<T> {
    pub rows: Vec<T>,
    pub skipped: usize,
}

fn collect_valid<T>(parsed: Vec<T>, is_valid: impl Fn(&T) -> bool) -> ParseOutcome<T> {
    let total = parsed.len();
    let rows: Vec<T> = parsed.into_iter().filter(|r| is_valid(r)).collect();
    let skipped = total - rows.len();
    ParseOutcome { rows, skipped }
}

// ============================================================================
// COMPANY IMPORT ("Importar Empresas")
// ============================================================================

/// Candidate company row: typed, with references still as raw names.
/// Valid only with both `nome` and `produto_id` present.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompanyRow {
    pub produto_id: Option<i64>,
    pub nome: Option<String>,
    pub cnpj: Option<String>,
    pub data_cadastro: Option<NaiveDate>,
    pub categoria: Option<String>,
    pub produto_contratado: Option<String>,
    pub cidade: Option<String>,
    pub estado: Option<String>,
    pub cartoes_emitidos: i64,
    pub potencial_movimentacao: f64,
    pub tipo_boleto: Option<String>,
    pub confeccao_cartao: f64,
    pub taxa_negativa: f64,
    pub taxa_positiva: f64,
    pub dias_prazo: i64,
    pub consultor_principal: Option<String>,
    pub consultor_agregado: Option<String>,
    pub parceiro: Option<String>,
}

impl CompanyRow {
    pub fn parse(row: &RawRow) -> CompanyRow {
        let opt_text = |cell: Option<&Data>| cell.and_then(clean_text);
        let num = |cell: Option<&Data>| cell.map(clean_number).unwrap_or(0.0);
        let pct = |cell: Option<&Data>| cell.map(clean_percent).unwrap_or(0.0);
        let int = |cell: Option<&Data>| cell.and_then(clean_int);

        CompanyRow {
            produto_id: int(row.key("Produto Id")).filter(|id| *id > 0),
            nome: opt_text(row.key("Empresa")),
            cnpj: opt_text(row.key("CNPJ")),
            data_cadastro: row.key("Data de Cadastro").and_then(clean_date),
            categoria: opt_text(row.key("Categoria")),
            produto_contratado: opt_text(row.key("Produto Contratado")),
            cidade: opt_text(row.key("Cidade")),
            estado: opt_text(row.key("Estado")),
            cartoes_emitidos: int(row.key_any(&["Cartões Emitidos", "Cartoes Emitidos"]))
                .unwrap_or(0),
            potencial_movimentacao: num(row.key_any(&[
                "Potencial de Movimentação",
                "Potencial de Movimentacao",
            ])),
            tipo_boleto: opt_text(row.key("Tipo do Boleto")),
            confeccao_cartao: num(row.key_any(&["Confecção de Cartão", "Confeccao de Cartao"])),
            taxa_negativa: pct(row.key("Taxa Negativa")),
            taxa_positiva: pct(row.key("Taxa Positiva")),
            dias_prazo: int(row.key("Dias de Prazo")).unwrap_or(0),
            consultor_principal: opt_text(row.key("Consultor Principal")),
            consultor_agregado: opt_text(row.key("Consultor Agregado")),
            parceiro: opt_text(row.key("Parceiro Comercial")),
        }
    }

    /// Import identity: a row without company name or external product id
    /// cannot be upserted and is dropped from the candidate set.
    pub fn is_valid(&self) -> bool {
        self.nome.is_some() && self.produto_id.is_some()
    }
}

/// Parse the company export: all rows, then filter invalid candidates.
pub fn parse_company_sheet(path: &Path) -> Result<ParseOutcome<CompanyRow>> {
    let raw = read_rows(path)?;
    let parsed: Vec<CompanyRow> = raw.iter().map(CompanyRow::parse).collect();
    Ok(collect_valid(parsed, CompanyRow::is_valid))
}

// ============================================================================
// MONTHLY CLOSING ("Fechamento Mensal")
// ============================================================================

/// Candidate closing row. Valid only with `produto_id` and a competence
/// month. `empresa` is display-only - resolution goes through produto_id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClosingRow {
    pub produto_id: Option<i64>,
    pub empresa: String,
    pub vendas: f64,
    pub taxa: f64,
    pub competencia: Option<NaiveDate>,
}

impl ClosingRow {
    pub fn parse(row: &RawRow) -> ClosingRow {
        // The competence column varies ("Mês Ref.", "Mes Referencia", ...):
        // any header containing "mes" supplies it.
        let mes_ref = row.key_contains("mes");
        ClosingRow {
            produto_id: row.key("Produto Id").and_then(clean_int).filter(|id| *id > 0),
            empresa: row.key("Empresa").and_then(clean_text).unwrap_or_default(),
            vendas: row.key("Vendas").map(clean_number).unwrap_or(0.0),
            taxa: row.key("Taxa").map(clean_number).unwrap_or(0.0),
            competencia: mes_ref.and_then(clean_competence),
        }
    }

    pub fn is_valid(&self) -> bool {
        self.produto_id.is_some() && self.competencia.is_some()
    }
}

/// Parse the monthly closing sheet: all rows, then filter invalid candidates.
pub fn parse_closing_sheet(path: &Path) -> Result<ParseOutcome<ClosingRow>> {
    let raw = read_rows(path)?;
    let parsed: Vec<ClosingRow> = raw.iter().map(ClosingRow::parse).collect();
    Ok(collect_valid(parsed, ClosingRow::is_valid))
}

/// Summary figures shown before confirming a closing import.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClosingPreview {
    pub competencia: Option<NaiveDate>,
    pub registros: usize,
    pub total_vendas: f64,
    pub total_taxa: f64,
}

impl ClosingPreview {
    pub fn of(outcome: &ParseOutcome<ClosingRow>) -> ClosingPreview {
        ClosingPreview {
            competencia: outcome.rows.first().and_then(|r| r.competencia),
            registros: outcome.rows.len(),
            total_vendas: outcome.rows.iter().map(|r| r.vendas).sum(),
            total_taxa: outcome.rows.iter().map(|r| r.taxa).sum(),
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn row(cells: Vec<(&str, Data)>) -> RawRow {
        RawRow {
            cells: cells.into_iter().map(|(k, v)| (k.to_string(), v)).collect(),
        }
    }

    fn s(v: &str) -> Data {
        Data::String(v.to_string())
    }

    #[test]
    fn test_parse_company_row_accented_headers() {
        let r = row(vec![
            ("Produto Id", s("101")),
            ("Empresa", s("Acme Ltda")),
            ("CNPJ", s("12.345.678/0001-00")),
            ("Data de Cadastro", s("10/02/2025")),
            ("Categoria", s("Varejo")),
            ("Produto Contratado", s("Cartão Alimentação")),
            ("Cidade", s("Campinas")),
            ("Estado", s("SP")),
            ("Cartões Emitidos", Data::Int(120)),
            ("Potencial de Movimentação", s("R$ 1.234,50")),
            ("Tipo do Boleto", s("Mensal")),
            ("Confecção de Cartão", s("5,00")),
            ("Taxa Negativa", s("2,50")),
            ("Taxa Positiva", s("3,00")),
            ("Dias de Prazo", s("30")),
            ("Consultor Principal", s("Maria Souza")),
            ("Consultor Agregado", s("-")),
            ("Parceiro Comercial", s("Rede Oeste")),
        ]);

        let parsed = CompanyRow::parse(&r);
        assert_eq!(parsed.produto_id, Some(101));
        assert_eq!(parsed.nome.as_deref(), Some("Acme Ltda"));
        assert_eq!(parsed.data_cadastro, NaiveDate::from_ymd_opt(2025, 2, 10));
        assert_eq!(parsed.cartoes_emitidos, 120);
        assert_eq!(parsed.potencial_movimentacao, 1234.50);
        assert_eq!(parsed.taxa_negativa, 0.025);
        assert_eq!(parsed.taxa_positiva, 0.03);
        assert_eq!(parsed.dias_prazo, 30);
        assert_eq!(parsed.consultor_agregado, None);
        assert_eq!(parsed.parceiro.as_deref(), Some("Rede Oeste"));
        assert!(parsed.is_valid());
    }

    #[test]
    fn test_parse_company_row_unaccented_fallback() {
        let r = row(vec![
            ("Produto Id", Data::Float(77.0)),
            ("Empresa", s("Beta")),
            ("Cartoes Emitidos", s("8")),
            ("Potencial de Movimentacao", s("500,00")),
        ]);
        let parsed = CompanyRow::parse(&r);
        assert_eq!(parsed.produto_id, Some(77));
        assert_eq!(parsed.cartoes_emitidos, 8);
        assert_eq!(parsed.potencial_movimentacao, 500.0);
    }

    #[test]
    fn test_company_row_identity_filter() {
        let no_id = row(vec![("Empresa", s("Sem Id"))]);
        assert!(!CompanyRow::parse(&no_id).is_valid());

        let no_name = row(vec![("Produto Id", s("5"))]);
        assert!(!CompanyRow::parse(&no_name).is_valid());

        let zero_id = row(vec![("Produto Id", s("0")), ("Empresa", s("Zero"))]);
        assert!(!CompanyRow::parse(&zero_id).is_valid());
    }

    #[test]
    fn test_collect_valid_counts_skipped() {
        let parsed = vec![
            CompanyRow::parse(&row(vec![("Produto Id", s("1")), ("Empresa", s("A"))])),
            CompanyRow::parse(&row(vec![("Empresa", s("B"))])),
            CompanyRow::parse(&row(vec![("Produto Id", s("3")), ("Empresa", s("C"))])),
        ];
        let outcome = collect_valid(parsed, CompanyRow::is_valid);
        assert_eq!(outcome.rows.len(), 2);
        assert_eq!(outcome.skipped, 1);
    }

    #[test]
    fn test_parse_closing_row_scenario() {
        // Reference scenario from the closing export.
        let r = row(vec![
            ("Produto Id", s("101")),
            ("Empresa", s("Acme")),
            ("Vendas", s("R$ 1.000,00")),
            ("Taxa", s("50,00")),
            ("Mês Ref", s("01/2026")),
        ]);
        let parsed = ClosingRow::parse(&r);
        assert_eq!(parsed.produto_id, Some(101));
        assert_eq!(parsed.empresa, "Acme");
        assert_eq!(parsed.vendas, 1000.0);
        assert_eq!(parsed.taxa, 50.0);
        assert_eq!(parsed.competencia, NaiveDate::from_ymd_opt(2026, 1, 1));
        assert!(parsed.is_valid());
    }

    #[test]
    fn test_parse_closing_row_mes_variants() {
        for header in ["Mês Ref.", "Mes Ref", "MES REFERENCIA"] {
            let r = row(vec![("Produto Id", s("7")), (header, s("05/03/2026"))]);
            let parsed = ClosingRow::parse(&r);
            assert_eq!(
                parsed.competencia,
                NaiveDate::from_ymd_opt(2026, 3, 1),
                "header variant: {header}"
            );
        }
    }

    #[test]
    fn test_closing_row_requires_competence() {
        let r = row(vec![("Produto Id", s("7")), ("Vendas", s("10"))]);
        assert!(!ClosingRow::parse(&r).is_valid());
    }

    #[test]
    fn test_closing_preview_totals() {
        let outcome = ParseOutcome {
            rows: vec![
                ClosingRow {
                    produto_id: Some(1),
                    empresa: "A".to_string(),
                    vendas: 1000.0,
                    taxa: 50.0,
                    competencia: NaiveDate::from_ymd_opt(2026, 1, 1),
                },
                ClosingRow {
                    produto_id: Some(2),
                    empresa: "B".to_string(),
                    vendas: 2500.0,
                    taxa: 125.0,
                    competencia: NaiveDate::from_ymd_opt(2026, 1, 1),
                },
            ],
            skipped: 0,
        };
        let preview = ClosingPreview::of(&outcome);
        assert_eq!(preview.registros, 2);
        assert_eq!(preview.total_vendas, 3500.0);
        assert_eq!(preview.total_taxa, 175.0);
        assert_eq!(preview.competencia, NaiveDate::from_ymd_opt(2026, 1, 1));
    }
}
