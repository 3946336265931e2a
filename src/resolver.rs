// 🔗 Reference Resolver - natural-key names to store ids
//
// Candidates arrive with consultant/partner/product references as raw names.
// Resolution is one pass, one read per entity type (never per row), with
// missing consultants and partners bulk-created before remapping. One
// unmatched name never aborts the batch - it degrades to a null reference.

use anyhow::Result;
use std::collections::{HashMap, HashSet};

use crate::db::Store;
use crate::entities::CompanyRecord;
use crate::normalizer::fold;
use crate::parser::CompanyRow;

/// Fold-insensitive name -> id map. The first variant encountered for a new
/// name becomes the canonical spelling in the store.
fn name_map<T>(items: &[T], nome: impl Fn(&T) -> &str, id: impl Fn(&T) -> i64) -> HashMap<String, i64> {
    items
        .iter()
        .map(|item| (fold(nome(item)), id(item)))
        .collect()
}

/// Collect referenced names absent from the lookup map, first-seen spelling
/// preserved, deduplicated by fold.
fn missing_names<'a>(
    referenced: impl Iterator<Item = &'a str>,
    known: &HashMap<String, i64>,
) -> Vec<String> {
    let mut seen: HashSet<String> = HashSet::new();
    let mut out = Vec::new();
    for nome in referenced {
        let key = fold(nome);
        if !known.contains_key(&key) && seen.insert(key) {
            out.push(nome.to_string());
        }
    }
    out
}

/// Resolve every candidate's references against the store, auto-creating
/// missing consultants (tipo "interno") and partners in at most two insert
/// calls. Output records are storage-ready: ids in place of names,
/// `peso_categoria` from the product catalog or 1.0.
///
/// Idempotent: running twice over the same input with no roster change
/// creates no duplicate rows - the fold-insensitive match catches the
/// pre-existing entries.
pub fn resolve_references(store: &dyn Store, candidates: &[CompanyRow]) -> Result<Vec<CompanyRecord>> {
    // One read per entity type, not per row
    let consultores = store.consultants()?;
    let parceiros = store.partners()?;
    let produtos = store.products()?;

    let mut consultor_map = name_map(&consultores, |c| c.nome.as_str(), |c| c.id);
    let mut parceiro_map = name_map(&parceiros, |p| p.nome.as_str(), |p| p.id);
    let peso_map: HashMap<String, f64> = produtos
        .iter()
        .map(|p| (fold(&p.nome), p.peso))
        .collect();

    // Names referenced but absent, both consultant roles plus partners
    let novos_consultores = missing_names(
        candidates.iter().flat_map(|r| {
            r.consultor_principal
                .as_deref()
                .into_iter()
                .chain(r.consultor_agregado.as_deref())
        }),
        &consultor_map,
    );
    let novos_parceiros = missing_names(
        candidates.iter().filter_map(|r| r.parceiro.as_deref()),
        &parceiro_map,
    );

    if !novos_consultores.is_empty() {
        for criado in store.insert_consultants(&novos_consultores)? {
            consultor_map.insert(fold(&criado.nome), criado.id);
        }
    }
    if !novos_parceiros.is_empty() {
        for criado in store.insert_partners(&novos_parceiros)? {
            parceiro_map.insert(fold(&criado.nome), criado.id);
        }
    }

    // Remap every candidate. A name that still fails to resolve (should not
    // happen post-insert) yields None, never an error.
    let lookup = |map: &HashMap<String, i64>, nome: &Option<String>| {
        nome.as_deref().and_then(|n| map.get(&fold(n)).copied())
    };

    let records = candidates
        .iter()
        .map(|r| CompanyRecord {
            produto_id: r.produto_id.unwrap_or(0),
            nome: r.nome.clone().unwrap_or_default(),
            cnpj: r.cnpj.clone(),
            data_cadastro: r.data_cadastro,
            categoria: r.categoria.clone(),
            produto_contratado: r.produto_contratado.clone(),
            cidade: r.cidade.clone(),
            estado: r.estado.clone(),
            cartoes_emitidos: r.cartoes_emitidos,
            potencial_movimentacao: r.potencial_movimentacao,
            peso_categoria: r
                .produto_contratado
                .as_deref()
                .and_then(|p| peso_map.get(&fold(p)).copied())
                .unwrap_or(1.0),
            tipo_boleto: r.tipo_boleto.clone(),
            confeccao_cartao: r.confeccao_cartao,
            taxa_negativa: r.taxa_negativa,
            taxa_positiva: r.taxa_positiva,
            dias_prazo: r.dias_prazo,
            ativo: true,
            consultor_principal_id: lookup(&consultor_map, &r.consultor_principal),
            consultor_agregado_id: lookup(&consultor_map, &r.consultor_agregado),
            parceiro_id: lookup(&parceiro_map, &r.parceiro),
        })
        .collect();

    Ok(records)
}

// ============================================================================
// TESTS
// ============================================================================
