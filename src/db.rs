// 🗄️ Datastore - Store trait + SQLite implementation
//
// The core never talks to a global client: the Resolver and the Aggregation
// Engine receive a &dyn Store, so tests can substitute a fake. SqliteStore is
// the real implementation; upsert/conflict resolution is delegated to SQL
// (ON CONFLICT ... DO UPDATE) exactly as the managed service would do it.
//
// Conflict keys:
// - empresas:       produto_id (external natural key)
// - movimentacoes:  (empresa_id, competencia) composite

use anyhow::{Context, Result};
use rusqlite::{params, Connection};
use std::collections::HashMap;
use std::path::Path;

use crate::entities::{CompanyRecord, Consultant, ForecastCompany, MovementRecord, Partner, Product};

// ============================================================================
// STORE TRAIT
// ============================================================================

/// The datastore operations the import and forecast pipelines rely on.
///
/// Contract assumed by callers: `upsert_*` is atomic and idempotent per batch
/// and conflict key - re-sending an identical row overwrites, never
/// duplicates. `insert_*` returns the created rows with their ids so lookup
/// maps can be merged without a second read.
pub trait Store {
    fn consultants(&self) -> Result<Vec<Consultant>>;
    fn partners(&self) -> Result<Vec<Partner>>;
    fn products(&self) -> Result<Vec<Product>>;

    /// Bulk-create consultants (tipo = "interno") by name.
    fn insert_consultants(&self, nomes: &[String]) -> Result<Vec<Consultant>>;

    /// Bulk-create partners by name.
    fn insert_partners(&self, nomes: &[String]) -> Result<Vec<Partner>>;

    /// Upsert one batch of companies on produto_id. Returns rows written.
    fn upsert_companies(&self, batch: &[CompanyRecord]) -> Result<usize>;

    /// Upsert one batch of movements on (empresa_id, competencia).
    fn upsert_movements(&self, batch: &[MovementRecord]) -> Result<usize>;

    /// Map external produto_id -> internal empresa id for the given ids.
    fn companies_by_product_id(&self, produto_ids: &[i64]) -> Result<HashMap<i64, i64>>;

    /// Active companies with consultant/partner names joined in - the
    /// Aggregation Engine's single company read.
    fn active_companies(&self) -> Result<Vec<ForecastCompany>>;

    /// Active consultant roster.
    fn active_consultants(&self) -> Result<Vec<Consultant>>;
}

// ============================================================================
// SQLITE STORE
// ============================================================================

pub struct SqliteStore {
    conn: Connection,
}

impl SqliteStore {
    /// Open (or create) the database file and ensure the schema exists.
    pub fn open(path: &Path) -> Result<SqliteStore> {
        let conn = Connection::open(path)
            .with_context(|| format!("Erro ao abrir o banco: {}", path.display()))?;
        let store = SqliteStore { conn };
        store.setup_schema()?;
        Ok(store)
    }

    /// In-memory database, used by tests and dry runs.
    pub fn open_in_memory() -> Result<SqliteStore> {
        let conn = Connection::open_in_memory()?;
        let store = SqliteStore { conn };
        store.setup_schema()?;
        Ok(store)
    }

    fn setup_schema(&self) -> Result<()> {
        // WAL for crash recovery
        self.conn.pragma_update(None, "journal_mode", "WAL")?;

        self.conn.execute(
            "CREATE TABLE IF NOT EXISTS consultores (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                nome TEXT NOT NULL UNIQUE,
                tipo TEXT NOT NULL DEFAULT 'interno',
                meta_mensal REAL NOT NULL DEFAULT 0,
                setor TEXT,
                gestor TEXT,
                ativo INTEGER NOT NULL DEFAULT 1,
                created_at DATETIME DEFAULT CURRENT_TIMESTAMP
            )",
            [],
        )?;

        self.conn.execute(
            "CREATE TABLE IF NOT EXISTS parceiros (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                nome TEXT NOT NULL UNIQUE,
                created_at DATETIME DEFAULT CURRENT_TIMESTAMP
            )",
            [],
        )?;

        self.conn.execute(
            "CREATE TABLE IF NOT EXISTS produtos (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                nome TEXT NOT NULL UNIQUE,
                peso REAL NOT NULL DEFAULT 1.0
            )",
            [],
        )?;

        self.conn.execute(
            "CREATE TABLE IF NOT EXISTS empresas (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                produto_id INTEGER NOT NULL UNIQUE,
                nome TEXT NOT NULL,
                cnpj TEXT,
                data_cadastro TEXT,
                categoria TEXT,
                produto_contratado TEXT,
                cidade TEXT,
                estado TEXT,
                cartoes_emitidos INTEGER NOT NULL DEFAULT 0,
                potencial_movimentacao REAL NOT NULL DEFAULT 0,
                peso_categoria REAL NOT NULL DEFAULT 1.0,
                tipo_boleto TEXT,
                confeccao_cartao REAL NOT NULL DEFAULT 0,
                taxa_negativa REAL NOT NULL DEFAULT 0,
                taxa_positiva REAL NOT NULL DEFAULT 0,
                dias_prazo INTEGER NOT NULL DEFAULT 0,
                ativo INTEGER NOT NULL DEFAULT 1,
                consultor_principal_id INTEGER REFERENCES consultores(id),
                consultor_agregado_id INTEGER REFERENCES consultores(id),
                parceiro_id INTEGER REFERENCES parceiros(id),
                created_at DATETIME DEFAULT CURRENT_TIMESTAMP
            )",
            [],
        )?;

        self.conn.execute(
            "CREATE TABLE IF NOT EXISTS movimentacoes (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                empresa_id INTEGER NOT NULL REFERENCES empresas(id),
                competencia TEXT NOT NULL,
                valor_movimentacao REAL NOT NULL DEFAULT 0,
                receita_taxa_positiva REAL NOT NULL DEFAULT 0,
                receita_total REAL NOT NULL DEFAULT 0,
                created_at DATETIME DEFAULT CURRENT_TIMESTAMP,
                UNIQUE(empresa_id, competencia)
            )",
            [],
        )?;

        self.conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_empresas_produto_id ON empresas(produto_id)",
            [],
        )?;
        self.conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_movimentacoes_competencia
             ON movimentacoes(competencia)",
            [],
        )?;

        Ok(())
    }

    /// Seed the product catalog (read-only reference data).
    pub fn seed_products(&self, produtos: &[(&str, f64)]) -> Result<()> {
        for (nome, peso) in produtos {
            self.conn.execute(
                "INSERT INTO produtos (nome, peso) VALUES (?1, ?2)
                 ON CONFLICT(nome) DO UPDATE SET peso = excluded.peso",
                params![nome, peso],
            )?;
        }
        Ok(())
    }

    /// Movement count for a competence month (driver reporting).
    pub fn movement_count(&self, competencia: &str) -> Result<i64> {
        let count = self.conn.query_row(
            "SELECT COUNT(*) FROM movimentacoes WHERE competencia = ?1",
            params![competencia],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    pub fn company_count(&self) -> Result<i64> {
        let count = self
            .conn
            .query_row("SELECT COUNT(*) FROM empresas", [], |row| row.get(0))?;
        Ok(count)
    }
}

fn consultant_from_row(row: &rusqlite::Row) -> rusqlite::Result<Consultant> {
    Ok(Consultant {
        id: row.get(0)?,
        nome: row.get(1)?,
        tipo: row.get(2)?,
        meta_mensal: row.get(3)?,
        setor: row.get(4)?,
        gestor: row.get(5)?,
        ativo: row.get::<_, i64>(6)? != 0,
    })
}

impl Store for SqliteStore {
    fn consultants(&self) -> Result<Vec<Consultant>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, nome, tipo, meta_mensal, setor, gestor, ativo FROM consultores",
        )?;
        let rows = stmt
            .query_map([], consultant_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    fn partners(&self) -> Result<Vec<Partner>> {
        let mut stmt = self.conn.prepare("SELECT id, nome FROM parceiros")?;
        let rows = stmt
            .query_map([], |row| {
                Ok(Partner {
                    id: row.get(0)?,
                    nome: row.get(1)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    fn products(&self) -> Result<Vec<Product>> {
        let mut stmt = self.conn.prepare("SELECT id, nome, peso FROM produtos")?;
        let rows = stmt
            .query_map([], |row| {
                Ok(Product {
                    id: row.get(0)?,
                    nome: row.get(1)?,
                    peso: row.get(2)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    fn insert_consultants(&self, nomes: &[String]) -> Result<Vec<Consultant>> {
        let mut created = Vec::with_capacity(nomes.len());
        for nome in nomes {
            self.conn.execute(
                "INSERT INTO consultores (nome, tipo) VALUES (?1, 'interno')
                 ON CONFLICT(nome) DO NOTHING",
                params![nome],
            )?;
            let consultant = self.conn.query_row(
                "SELECT id, nome, tipo, meta_mensal, setor, gestor, ativo
                 FROM consultores WHERE nome = ?1",
                params![nome],
                consultant_from_row,
            )?;
            created.push(consultant);
        }
        Ok(created)
    }

    fn insert_partners(&self, nomes: &[String]) -> Result<Vec<Partner>> {
        let mut created = Vec::with_capacity(nomes.len());
        for nome in nomes {
            self.conn.execute(
                "INSERT INTO parceiros (nome) VALUES (?1)
                 ON CONFLICT(nome) DO NOTHING",
                params![nome],
            )?;
            let partner = self.conn.query_row(
                "SELECT id, nome FROM parceiros WHERE nome = ?1",
                params![nome],
                |row| {
                    Ok(Partner {
                        id: row.get(0)?,
                        nome: row.get(1)?,
                    })
                },
            )?;
            created.push(partner);
        }
        Ok(created)
    }

    fn upsert_companies(&self, batch: &[CompanyRecord]) -> Result<usize> {
        // One transaction per batch: a mid-batch failure rolls the whole
        // batch back, keeping the report's inserted count honest.
        let tx = self.conn.unchecked_transaction()?;
        let mut stmt = tx.prepare_cached(
            "INSERT INTO empresas (
                produto_id, nome, cnpj, data_cadastro, categoria, produto_contratado,
                cidade, estado, cartoes_emitidos, potencial_movimentacao, peso_categoria,
                tipo_boleto, confeccao_cartao, taxa_negativa, taxa_positiva, dias_prazo,
                ativo, consultor_principal_id, consultor_agregado_id, parceiro_id
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18, ?19, ?20)
            ON CONFLICT(produto_id) DO UPDATE SET
                nome = excluded.nome,
                cnpj = excluded.cnpj,
                data_cadastro = excluded.data_cadastro,
                categoria = excluded.categoria,
                produto_contratado = excluded.produto_contratado,
                cidade = excluded.cidade,
                estado = excluded.estado,
                cartoes_emitidos = excluded.cartoes_emitidos,
                potencial_movimentacao = excluded.potencial_movimentacao,
                peso_categoria = excluded.peso_categoria,
                tipo_boleto = excluded.tipo_boleto,
                confeccao_cartao = excluded.confeccao_cartao,
                taxa_negativa = excluded.taxa_negativa,
                taxa_positiva = excluded.taxa_positiva,
                dias_prazo = excluded.dias_prazo,
                ativo = excluded.ativo,
                consultor_principal_id = excluded.consultor_principal_id,
                consultor_agregado_id = excluded.consultor_agregado_id,
                parceiro_id = excluded.parceiro_id",
        )?;

        let mut written = 0;
        for rec in batch {
            stmt.execute(params![
                rec.produto_id,
                rec.nome,
                rec.cnpj,
                rec.data_cadastro.map(|d| d.to_string()),
                rec.categoria,
                rec.produto_contratado,
                rec.cidade,
                rec.estado,
                rec.cartoes_emitidos,
                rec.potencial_movimentacao,
                rec.peso_categoria,
                rec.tipo_boleto,
                rec.confeccao_cartao,
                rec.taxa_negativa,
                rec.taxa_positiva,
                rec.dias_prazo,
                rec.ativo as i64,
                rec.consultor_principal_id,
                rec.consultor_agregado_id,
                rec.parceiro_id,
            ])?;
            written += 1;
        }
        drop(stmt);
        tx.commit()?;
        Ok(written)
    }

    fn upsert_movements(&self, batch: &[MovementRecord]) -> Result<usize> {
        let tx = self.conn.unchecked_transaction()?;
        let mut stmt = tx.prepare_cached(
            "INSERT INTO movimentacoes (
                empresa_id, competencia, valor_movimentacao,
                receita_taxa_positiva, receita_total
            ) VALUES (?1, ?2, ?3, ?4, ?5)
            ON CONFLICT(empresa_id, competencia) DO UPDATE SET
                valor_movimentacao = excluded.valor_movimentacao,
                receita_taxa_positiva = excluded.receita_taxa_positiva,
                receita_total = excluded.receita_total",
        )?;

        let mut written = 0;
        for rec in batch {
            stmt.execute(params![
                rec.empresa_id,
                rec.competencia.to_string(),
                rec.valor_movimentacao,
                rec.receita_taxa_positiva,
                rec.receita_total,
            ])?;
            written += 1;
        }
        drop(stmt);
        tx.commit()?;
        Ok(written)
    }

    fn companies_by_product_id(&self, produto_ids: &[i64]) -> Result<HashMap<i64, i64>> {
        if produto_ids.is_empty() {
            return Ok(HashMap::new());
        }

        // Single set query, not one SELECT per id
        let placeholders = vec!["?"; produto_ids.len()].join(", ");
        let mut stmt = self.conn.prepare(&format!(
            "SELECT produto_id, id FROM empresas WHERE produto_id IN ({placeholders})"
        ))?;

        let mut map = HashMap::with_capacity(produto_ids.len());
        let mut rows = stmt.query(rusqlite::params_from_iter(produto_ids))?;
        while let Some(row) = rows.next()? {
            map.insert(row.get(0)?, row.get(1)?);
        }
        Ok(map)
    }

    fn active_companies(&self) -> Result<Vec<ForecastCompany>> {
        let mut stmt = self.conn.prepare(
            "SELECT e.nome, e.categoria, e.produto_contratado,
                    e.potencial_movimentacao, e.peso_categoria,
                    e.consultor_principal_id, c.nome, p.nome
             FROM empresas e
             LEFT JOIN consultores c ON c.id = e.consultor_principal_id
             LEFT JOIN parceiros p ON p.id = e.parceiro_id
             WHERE e.ativo = 1",
        )?;
        let rows = stmt
            .query_map([], |row| {
                Ok(ForecastCompany {
                    nome: row.get(0)?,
                    categoria: row.get(1)?,
                    produto_contratado: row.get(2)?,
                    potencial_movimentacao: row.get(3)?,
                    peso_categoria: row.get(4)?,
                    consultor_id: row.get(5)?,
                    consultor_nome: row.get(6)?,
                    parceiro_nome: row.get(7)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    fn active_consultants(&self) -> Result<Vec<Consultant>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, nome, tipo, meta_mensal, setor, gestor, ativo
             FROM consultores WHERE ativo = 1",
        )?;
        let rows = stmt
            .query_map([], consultant_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }
}

// ============================================================================
// TESTS
// ============================================================================
