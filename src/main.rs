use anyhow::{anyhow, Result};
use std::env;
use std::path::{Path, PathBuf};

use vegas_card::{
    build_dashboard, run_closing_import, run_company_import, ImportReport, ImportSession,
    ImportStatus, SqliteStore,
};

fn main() -> Result<()> {
    let args: Vec<String> = env::args().collect();

    match args.get(1).map(String::as_str) {
        Some("importar") => {
            let path = arg_path(&args, 2, "importar <planilha.xlsx>")?;
            cmd_importar(&path)
        }
        Some("fechamento") => {
            let path = arg_path(&args, 2, "fechamento <planilha.xlsx>")?;
            cmd_fechamento(&path)
        }
        Some("previsao") => {
            let (gestor, json) = previsao_args(&args);
            cmd_previsao(gestor, json)
        }
        _ => {
            print_usage();
            Ok(())
        }
    }
}

fn print_usage() {
    println!("♠ Vegas Card v{}", vegas_card::VERSION);
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    println!("Uso:");
    println!("  vegas-card importar <planilha.xlsx>    importa empresas");
    println!("  vegas-card fechamento <planilha.xlsx>  importa fechamento mensal");
    println!("  vegas-card previsao [gestor] [--json]  dashboard de previsão");
    println!();
    println!("Banco: {} (ou VEGAS_DB)", default_db_path().display());
}

/// Arguments after `previsao`, in any order: the first non-flag is the
/// gestor, `--json` may come before or after it.
fn previsao_args(args: &[String]) -> (Option<&str>, bool) {
    let rest = &args[args.len().min(2)..];
    let json = rest.iter().any(|a| a == "--json");
    let gestor = rest
        .iter()
        .find(|a| !a.starts_with("--"))
        .map(String::as_str);
    (gestor, json)
}

fn arg_path(args: &[String], idx: usize, usage: &str) -> Result<PathBuf> {
    args.get(idx)
        .map(PathBuf::from)
        .ok_or_else(|| anyhow!("Uso: vegas-card {}", usage))
}

fn default_db_path() -> PathBuf {
    env::var("VEGAS_DB")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("vegas.db"))
}

fn open_store() -> Result<SqliteStore> {
    SqliteStore::open(&default_db_path())
}

fn print_report(report: &ImportReport) {
    println!("✓ {} linhas gravadas", report.inserted);
    if report.skipped > 0 {
        println!("✓ {} linhas ignoradas (campos de identidade ausentes)", report.skipped);
    }
    for erro in &report.errors {
        println!("❌ {}", erro);
    }
}

fn cmd_importar(path: &Path) -> Result<()> {
    println!("📥 Importação de Empresas");
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    let store = open_store()?;
    let mut session = ImportSession::new();
    session.transition(ImportStatus::Parsing)?;

    println!("\n📂 Lendo {}...", path.display());
    session.transition(ImportStatus::Confirming)?;
    session.transition(ImportStatus::Importing)?;
    let report = match run_company_import(&store, path) {
        Ok(report) => report,
        Err(e) => {
            session.transition(ImportStatus::Error)?;
            return Err(e);
        }
    };

    session.transition(if report.ok() {
        ImportStatus::Done
    } else {
        ImportStatus::Error
    })?;

    print_report(&report);
    println!("✓ Total de empresas no banco: {}", store.company_count()?);
    Ok(())
}

fn cmd_fechamento(path: &Path) -> Result<()> {
    println!("📅 Importação de Fechamento Mensal");
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    let store = open_store()?;
    let mut session = ImportSession::new();
    session.transition(ImportStatus::Parsing)?;

    println!("\n📂 Lendo {}...", path.display());
    session.transition(ImportStatus::Confirming)?;
    session.transition(ImportStatus::Importing)?;
    let (preview, report) = match run_closing_import(&store, path) {
        Ok(out) => out,
        Err(e) => {
            session.transition(ImportStatus::Error)?;
            return Err(e);
        }
    };

    session.transition(if report.ok() {
        ImportStatus::Done
    } else {
        ImportStatus::Error
    })?;

    if let Some(competencia) = preview.competencia {
        println!("✓ Competência: {}", competencia.format("%m/%Y"));
    }
    println!("✓ Vendas: {}", moeda(preview.total_vendas));
    println!("✓ Receita de taxa: {}", moeda(preview.total_taxa));
    print_report(&report);
    Ok(())
}

fn cmd_previsao(gestor: Option<&str>, json: bool) -> Result<()> {
    let store = open_store()?;
    let dash = build_dashboard(&store, gestor)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&dash)?);
        return Ok(());
    }

    println!("📊 Dashboard de Previsão");
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    if let Some(g) = gestor.filter(|g| *g != "Geral") {
        println!("Gestor: {}", g);
    }
    println!("\n✓ Empresas ativas:     {}", dash.totais.empresas);
    println!("✓ Potencial bruto:     {}", moeda(dash.totais.potencial));
    println!("✓ Resultado esperado:  {}", moeda(dash.totais.resultado));
    println!("✓ Meta total:          {}", moeda(dash.totais.meta));
    println!("✓ Previsão vs meta:    {:.1}%", dash.totais.forecast_ratio());

    println!("\n👤 Por Consultor");
    for c in &dash.consultores {
        println!(
            "  {:<30} {:>4} empresas  {}  meta {}  ({:.1}%)",
            c.nome,
            c.empresas,
            moeda(c.resultado),
            moeda(c.meta),
            c.pct_meta()
        );
    }

    println!("\n📦 Por Categoria");
    for g in &dash.categorias {
        println!("  {:<30} {:>4} empresas  {}", g.nome, g.empresas, moeda(g.resultado));
    }

    println!("\n🎯 Por Produto");
    for g in &dash.produtos {
        println!(
            "  {:<30} peso {:>3.0}%  {:>4} empresas  {}",
            g.nome,
            g.peso * 100.0,
            g.empresas,
            moeda(g.resultado)
        );
    }

    println!("\n🤝 Por Parceiro");
    for g in &dash.parceiros {
        println!("  {:<30} {:>4} empresas  {}", g.nome, g.empresas, moeda(g.resultado));
    }

    println!("\n🏆 Top {} Empresas", vegas_card::TOP_EMPRESAS);
    for (i, e) in dash.top_empresas.iter().enumerate() {
        println!(
            "  {:>2}. {:<30} {}  ({})",
            i + 1,
            e.nome,
            moeda(e.resultado),
            e.consultor
        );
    }

    Ok(())
}

/// pt-BR currency rendering: R$ 1.234,56
fn moeda(v: f64) -> String {
    let negativo = v < 0.0;
    let centavos = (v.abs() * 100.0).round() as u64;
    let inteiro = centavos / 100;
    let resto = centavos % 100;

    let digits = inteiro.to_string();
    let mut agrupado = String::new();
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            agrupado.push('.');
        }
        agrupado.push(ch);
    }

    format!(
        "{}R$ {},{:02}",
        if negativo { "-" } else { "" },
        agrupado,
        resto
    )
}
