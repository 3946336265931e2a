// 🏢 Domain Entities - Vegas Card commercial records
//
// Natural keys drive everything: companies are keyed by the external
// produto_id, consultants and partners by fold-insensitive name, movements by
// (empresa_id, competencia). Surrogate ids exist only inside the store.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

// ============================================================================
// ROSTER ENTITIES
// ============================================================================

/// Sales consultant. Auto-created on first reference during import
/// (tipo = "interno"); quotas, sector and manager are maintained by hand.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Consultant {
    pub id: i64,
    pub nome: String,
    pub tipo: String,
    pub meta_mensal: f64,
    pub setor: Option<String>,
    pub gestor: Option<String>,
    pub ativo: bool,
}

/// Commercial partner. Auto-created on first reference during import.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Partner {
    pub id: i64,
    pub nome: String,
}

/// Catalog product. Read-only: `peso` is the multiplier applied to a
/// company's potential to estimate the realistic forecasted result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Product {
    pub id: i64,
    pub nome: String,
    pub peso: f64,
}

// ============================================================================
// STORAGE-READY RECORDS
// ============================================================================

/// Company record with references resolved to store ids, ready for upsert
/// keyed on `produto_id`. `peso_categoria` is never absent: it defaults to
/// 1.0 when the contracted product has no catalog weight.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompanyRecord {
    pub produto_id: i64,
    pub nome: String,
    pub cnpj: Option<String>,
    pub data_cadastro: Option<NaiveDate>,
    pub categoria: Option<String>,
    pub produto_contratado: Option<String>,
    pub cidade: Option<String>,
    pub estado: Option<String>,
    pub cartoes_emitidos: i64,
    pub potencial_movimentacao: f64,
    pub peso_categoria: f64,
    pub tipo_boleto: Option<String>,
    pub confeccao_cartao: f64,
    pub taxa_negativa: f64,
    pub taxa_positiva: f64,
    pub dias_prazo: i64,
    pub ativo: bool,
    pub consultor_principal_id: Option<i64>,
    pub consultor_agregado_id: Option<i64>,
    pub parceiro_id: Option<i64>,
}

/// Monthly closing record, upserted on the (empresa_id, competencia)
/// composite key. Later rows for the same month replace earlier ones.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MovementRecord {
    pub empresa_id: i64,
    pub competencia: NaiveDate,
    pub valor_movimentacao: f64,
    pub receita_taxa_positiva: f64,
    pub receita_total: f64,
}

// ============================================================================
// READ MODEL
// ============================================================================

/// Active company as the Aggregation Engine consumes it: resolved consultant
/// and partner names joined in, one read per dashboard load.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForecastCompany {
    pub nome: String,
    pub categoria: Option<String>,
    pub produto_contratado: Option<String>,
    pub potencial_movimentacao: f64,
    pub peso_categoria: f64,
    pub consultor_id: Option<i64>,
    pub consultor_nome: Option<String>,
    pub parceiro_nome: Option<String>,
}

impl ForecastCompany {
    /// Expected result: potential weighted by the category weight.
    pub fn resultado(&self) -> f64 {
        self.potencial_movimentacao * self.peso_categoria
    }
}
