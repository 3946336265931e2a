// 📊 Forecast Aggregation - dashboard read model
//
// One pass over the active companies builds every grouped view at once:
// per-consultant vs quota, per-category, per-product, per-partner, plus the
// flat per-company ranking. Nothing is persisted, every load recomputes from
// the full dataset. resultado = potencial * peso_categoria throughout.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::db::Store;
use crate::entities::ForecastCompany;

/// Companies kept in the ranking view.
pub const TOP_EMPRESAS: usize = 15;

const SEM_PARCEIRO: &str = "Sem Parceiro";
const OUTROS: &str = "Outros";

// ============================================================================
// DASHBOARD TYPES
// ============================================================================

/// Consultant row: forecast against the monthly quota.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsultantForecast {
    pub nome: String,
    pub setor: Option<String>,
    pub meta: f64,
    pub potencial: f64,
    pub resultado: f64,
    pub empresas: usize,
}

impl ConsultantForecast {
    /// Forecast as a percentage of the quota, 0 when no quota is set.
    pub fn pct_meta(&self) -> f64 {
        if self.meta > 0.0 {
            self.resultado / self.meta * 100.0
        } else {
            0.0
        }
    }
}

/// Grouped row shared by the category, product and partner views. `peso` is
/// only meaningful for the product view (the weight of the first company
/// seen under that product).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroupForecast {
    pub nome: String,
    pub potencial: f64,
    pub resultado: f64,
    pub empresas: usize,
    pub peso: f64,
}

/// Flat company row for the top-N ranking. Missing consultant/partner names
/// render as "—".
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompanyForecast {
    pub nome: String,
    pub produto: Option<String>,
    pub categoria: Option<String>,
    pub consultor: String,
    pub parceiro: String,
    pub potencial: f64,
    pub resultado: f64,
}

/// Grand totals over the in-scope company set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Totals {
    pub potencial: f64,
    pub resultado: f64,
    pub meta: f64,
    pub empresas: usize,
}

impl Totals {
    /// Expected result against total quota, in percent. 0 when no quota
    /// exists, never a division by zero.
    pub fn forecast_ratio(&self) -> f64 {
        if self.meta > 0.0 {
            self.resultado / self.meta * 100.0
        } else {
            0.0
        }
    }
}

/// Complete dashboard payload, every view sorted descending by resultado.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DashboardSummary {
    pub totais: Totals,
    pub consultores: Vec<ConsultantForecast>,
    pub categorias: Vec<GroupForecast>,
    pub produtos: Vec<GroupForecast>,
    pub parceiros: Vec<GroupForecast>,
    pub top_empresas: Vec<CompanyForecast>,
}

// ============================================================================
// AGGREGATION
// ============================================================================

/// Roster entry the aggregation needs: quota, sector and manager.
#[derive(Debug, Clone)]
pub struct RosterConsultant {
    pub id: i64,
    pub nome: String,
    pub meta_mensal: f64,
    pub setor: Option<String>,
    pub gestor: Option<String>,
}

fn bump(map: &mut HashMap<String, GroupForecast>, nome: &str, pot: f64, resultado: f64, peso: f64) {
    let entry = map.entry(nome.to_string()).or_insert_with(|| GroupForecast {
        nome: nome.to_string(),
        potencial: 0.0,
        resultado: 0.0,
        empresas: 0,
        peso,
    });
    entry.potencial += pot;
    entry.resultado += resultado;
    entry.empresas += 1;
}

fn sorted_desc(map: HashMap<String, GroupForecast>) -> Vec<GroupForecast> {
    let mut rows: Vec<GroupForecast> = map.into_values().collect();
    rows.sort_by(|a, b| b.resultado.total_cmp(&a.resultado));
    rows
}

/// Build the full dashboard from an explicit company set and consultant
/// roster. `gestor` restricts both the roster and the companies to
/// consultants under that manager; None or "Geral" means no restriction.
pub fn aggregate(
    companies: &[ForecastCompany],
    consultores: &[RosterConsultant],
    gestor: Option<&str>,
) -> DashboardSummary {
    let filtro = gestor.filter(|g| *g != "Geral");

    let roster: Vec<&RosterConsultant> = consultores
        .iter()
        .filter(|c| match filtro {
            Some(g) => c.gestor.as_deref() == Some(g),
            None => true,
        })
        .collect();

    let mut consultor_map: HashMap<i64, ConsultantForecast> = roster
        .iter()
        .map(|c| {
            (
                c.id,
                ConsultantForecast {
                    nome: c.nome.clone(),
                    setor: c.setor.clone(),
                    meta: c.meta_mensal,
                    potencial: 0.0,
                    resultado: 0.0,
                    empresas: 0,
                },
            )
        })
        .collect();

    // With a manager filter active, only companies tied to the filtered
    // roster stay in scope.
    let in_scope: Vec<&ForecastCompany> = companies
        .iter()
        .filter(|e| match filtro {
            Some(_) => e
                .consultor_id
                .map(|id| consultor_map.contains_key(&id))
                .unwrap_or(false),
            None => true,
        })
        .collect();

    let mut cat_map: HashMap<String, GroupForecast> = HashMap::new();
    let mut prod_map: HashMap<String, GroupForecast> = HashMap::new();
    let mut parc_map: HashMap<String, GroupForecast> = HashMap::new();
    let mut empresas: Vec<CompanyForecast> = Vec::new();
    let mut total_potencial = 0.0;
    let mut total_resultado = 0.0;

    for e in &in_scope {
        let pot = e.potencial_movimentacao;
        let resultado = e.resultado();
        total_potencial += pot;
        total_resultado += resultado;

        if let Some(id) = e.consultor_id {
            if let Some(c) = consultor_map.get_mut(&id) {
                c.potencial += pot;
                c.resultado += resultado;
                c.empresas += 1;
            }
        }

        let cat = e.categoria.as_deref().unwrap_or(OUTROS);
        bump(&mut cat_map, cat, pot, resultado, 1.0);

        let prod = e.produto_contratado.as_deref().unwrap_or(OUTROS);
        bump(&mut prod_map, prod, pot, resultado, e.peso_categoria);

        let parc = e.parceiro_nome.as_deref().unwrap_or(SEM_PARCEIRO);
        bump(&mut parc_map, parc, pot, resultado, 1.0);

        empresas.push(CompanyForecast {
            nome: e.nome.clone(),
            produto: e.produto_contratado.clone(),
            categoria: e.categoria.clone(),
            consultor: e.consultor_nome.clone().unwrap_or_else(|| "—".to_string()),
            parceiro: e.parceiro_nome.clone().unwrap_or_else(|| "—".to_string()),
            potencial: pot,
            resultado,
        });
    }

    let total_meta: f64 = roster.iter().map(|c| c.meta_mensal).sum();

    // Consultants with neither forecast nor quota are noise, drop them
    let mut consultores_view: Vec<ConsultantForecast> = consultor_map
        .into_values()
        .filter(|c| c.resultado > 0.0 || c.meta > 0.0)
        .collect();
    consultores_view.sort_by(|a, b| b.resultado.total_cmp(&a.resultado));

    // "Sem Parceiro" stays in the totals but never ranks as a partner
    let mut parceiros_view: Vec<GroupForecast> = parc_map
        .into_values()
        .filter(|p| p.nome != SEM_PARCEIRO)
        .collect();
    parceiros_view.sort_by(|a, b| b.resultado.total_cmp(&a.resultado));

    empresas.sort_by(|a, b| b.resultado.total_cmp(&a.resultado));
    empresas.truncate(TOP_EMPRESAS);

    DashboardSummary {
        totais: Totals {
            potencial: total_potencial,
            resultado: total_resultado,
            meta: total_meta,
            empresas: in_scope.len(),
        },
        consultores: consultores_view,
        categorias: sorted_desc(cat_map),
        produtos: sorted_desc(prod_map),
        parceiros: parceiros_view,
        top_empresas: empresas,
    }
}

/// Read-and-aggregate entry point: two store reads, one aggregation pass.
pub fn build_dashboard(store: &dyn Store, gestor: Option<&str>) -> Result<DashboardSummary> {
    let companies = store.active_companies()?;
    let consultores: Vec<RosterConsultant> = store
        .active_consultants()?
        .into_iter()
        .map(|c| RosterConsultant {
            id: c.id,
            nome: c.nome,
            meta_mensal: c.meta_mensal,
            setor: c.setor,
            gestor: c.gestor,
        })
        .collect();
    Ok(aggregate(&companies, &consultores, gestor))
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn company(nome: &str, pot: f64, peso: f64) -> ForecastCompany {
        ForecastCompany {
            nome: nome.to_string(),
            categoria: None,
            produto_contratado: None,
            potencial_movimentacao: pot,
            peso_categoria: peso,
            consultor_id: None,
            consultor_nome: None,
            parceiro_nome: None,
        }
    }

    fn consultant(id: i64, nome: &str, meta: f64, gestor: Option<&str>) -> RosterConsultant {
        RosterConsultant {
            id,
            nome: nome.to_string(),
            meta_mensal: meta,
            setor: None,
            gestor: gestor.map(|g| g.to_string()),
        }
    }

    #[test]
    fn test_totals_and_ratio() {
        let mut a = company("Acme", 1000.0, 0.5);
        a.consultor_id = Some(1);
        let b = company("Beta", 500.0, 1.0);
        let roster = vec![consultant(1, "Ana", 800.0, None)];

        let dash = aggregate(&[a, b], &roster, None);
        assert_eq!(dash.totais.potencial, 1500.0);
        assert_eq!(dash.totais.resultado, 1000.0);
        assert_eq!(dash.totais.meta, 800.0);
        assert_eq!(dash.totais.empresas, 2);
        assert_eq!(dash.totais.forecast_ratio(), 125.0);
    }

    #[test]
    fn test_ratio_zero_when_no_quota() {
        let dash = aggregate(&[company("Acme", 1000.0, 1.0)], &[], None);
        assert_eq!(dash.totais.meta, 0.0);
        assert_eq!(dash.totais.forecast_ratio(), 0.0);
    }

    #[test]
    fn test_missing_groups_get_defaults() {
        let dash = aggregate(&[company("Acme", 100.0, 1.0)], &[], None);
        assert_eq!(dash.categorias[0].nome, "Outros");
        assert_eq!(dash.produtos[0].nome, "Outros");
        // Defaulted partner group is in totals but not in the ranking
        assert!(dash.parceiros.is_empty());
        assert_eq!(dash.totais.resultado, 100.0);
    }

    #[test]
    fn test_partner_ranking_excludes_default_group() {
        let mut a = company("Acme", 100.0, 1.0);
        a.parceiro_nome = Some("Rede Oeste".to_string());
        let b = company("Beta", 200.0, 1.0);

        let dash = aggregate(&[a, b], &[], None);
        assert_eq!(dash.parceiros.len(), 1);
        assert_eq!(dash.parceiros[0].nome, "Rede Oeste");
        assert_eq!(dash.totais.resultado, 300.0);
    }

    #[test]
    fn test_views_sorted_desc_and_top_truncated() {
        let companies: Vec<ForecastCompany> = (0..20)
            .map(|i| {
                let mut c = company(&format!("Empresa {i}"), (i as f64 + 1.0) * 10.0, 1.0);
                c.categoria = Some(format!("Cat {}", i % 3));
                c
            })
            .collect();

        let dash = aggregate(&companies, &[], None);
        assert_eq!(dash.top_empresas.len(), TOP_EMPRESAS);
        assert_eq!(dash.top_empresas[0].nome, "Empresa 19");
        assert!(dash
            .top_empresas
            .windows(2)
            .all(|w| w[0].resultado >= w[1].resultado));
        assert!(dash
            .categorias
            .windows(2)
            .all(|w| w[0].resultado >= w[1].resultado));
    }

    #[test]
    fn test_consultants_without_forecast_or_quota_dropped() {
        let mut a = company("Acme", 100.0, 1.0);
        a.consultor_id = Some(1);
        let roster = vec![
            consultant(1, "Ana", 0.0, None),
            consultant(2, "Bia", 500.0, None),
            consultant(3, "Caio", 0.0, None),
        ];

        let dash = aggregate(&[a], &roster, None);
        let nomes: Vec<&str> = dash.consultores.iter().map(|c| c.nome.as_str()).collect();
        assert!(nomes.contains(&"Ana"));
        assert!(nomes.contains(&"Bia"));
        assert!(!nomes.contains(&"Caio"));
    }

    #[test]
    fn test_company_outside_roster_counts_in_groups_only() {
        // Consultant reference not in the active roster: company still feeds
        // the category/product/partner views and totals.
        let mut a = company("Acme", 100.0, 1.0);
        a.consultor_id = Some(99);

        let dash = aggregate(&[a], &[], None);
        assert!(dash.consultores.is_empty());
        assert_eq!(dash.totais.resultado, 100.0);
        assert_eq!(dash.categorias[0].empresas, 1);
    }

    #[test]
    fn test_manager_filter_restricts_roster_and_companies() {
        let mut a = company("Acme", 100.0, 1.0);
        a.consultor_id = Some(1);
        let mut b = company("Beta", 200.0, 1.0);
        b.consultor_id = Some(2);
        let c = company("Gama", 400.0, 1.0);

        let roster = vec![
            consultant(1, "Ana", 300.0, Some("Paulo")),
            consultant(2, "Bia", 500.0, Some("Rita")),
        ];

        let dash = aggregate(&[a.clone(), b.clone(), c.clone()], &roster, Some("Paulo"));
        assert_eq!(dash.totais.empresas, 1);
        assert_eq!(dash.totais.potencial, 100.0);
        assert_eq!(dash.totais.meta, 300.0);
        assert_eq!(dash.consultores.len(), 1);
        assert_eq!(dash.consultores[0].nome, "Ana");

        // "Geral" behaves exactly like no filter
        let geral = aggregate(&[a, b, c], &roster, Some("Geral"));
        assert_eq!(geral.totais.empresas, 3);
        assert_eq!(geral.totais.meta, 800.0);
    }

    #[test]
    fn test_product_view_carries_weight() {
        let mut a = company("Acme", 100.0, 0.8);
        a.produto_contratado = Some("Cartão Alimentação".to_string());
        let dash = aggregate(&[a], &[], None);
        assert_eq!(dash.produtos[0].peso, 0.8);
        assert_eq!(dash.produtos[0].resultado, 80.0);
    }
}
