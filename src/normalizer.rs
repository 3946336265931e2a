// 🧹 Cell Normalizer - Tolerant spreadsheet cell cleanup
//
// The source system exports .xlsx files with inconsistent encoding (headers
// with or without accents), Brazilian number locale ("R$ 1.234,50") and mixed
// cell typing (text vs native dates). Everything downstream works with the
// typed values produced here.
//
// Contract: normalizers never fail. Unparsable input degrades to the field's
// empty value (None or 0.0), it never aborts a row or an import.

use calamine::Data;
use chrono::NaiveDate;

// ============================================================================
// DIACRITIC / CASE FOLDING
// ============================================================================

/// Fold a string for insensitive comparison: lowercase, trim, strip accents.
///
/// "Mês Ref." and "mes ref." fold to the same key. Covers the Latin-1
/// accented range, which is all the source exports produce.
pub fn fold(s: &str) -> String {
    s.trim()
        .chars()
        .map(strip_accent)
        .flat_map(char::to_lowercase)
        .collect()
}

fn strip_accent(c: char) -> char {
    match c {
        'á' | 'à' | 'â' | 'ã' | 'ä' | 'Á' | 'À' | 'Â' | 'Ã' | 'Ä' => 'a',
        'é' | 'è' | 'ê' | 'ë' | 'É' | 'È' | 'Ê' | 'Ë' => 'e',
        'í' | 'ì' | 'î' | 'ï' | 'Í' | 'Ì' | 'Î' | 'Ï' => 'i',
        'ó' | 'ò' | 'ô' | 'õ' | 'ö' | 'Ó' | 'Ò' | 'Ô' | 'Õ' | 'Ö' => 'o',
        'ú' | 'ù' | 'û' | 'ü' | 'Ú' | 'Ù' | 'Û' | 'Ü' => 'u',
        'ç' | 'Ç' => 'c',
        'ñ' | 'Ñ' => 'n',
        _ => c,
    }
}

// ============================================================================
// HEADER LOOKUP
// ============================================================================

/// Find a cell by header, tolerating encoding differences.
///
/// Strategy:
/// 1. Exact key match
/// 2. Fold-insensitive exact match ("Cartões Emitidos" == "Cartoes Emitidos")
///
/// Returns None when no header matches - callers must treat that as distinct
/// from a present-but-empty cell.
pub fn find_key<'a>(cells: &'a [(String, Data)], target: &str) -> Option<&'a Data> {
    if let Some((_, v)) = cells.iter().find(|(k, _)| k == target) {
        return Some(v);
    }
    let t = fold(target);
    cells.iter().find(|(k, _)| fold(k) == t).map(|(_, v)| v)
}

/// Fallback lookup: fold-insensitive substring match.
///
/// Used when a column is known only by a fragment, e.g. any header containing
/// "mes" supplies the competence month ("Mês Ref.", "Mes Referencia", ...).
pub fn find_key_contains<'a>(cells: &'a [(String, Data)], fragment: &str) -> Option<&'a Data> {
    let f = fold(fragment);
    cells.iter().find(|(k, _)| fold(k).contains(&f)).map(|(_, v)| v)
}

// ============================================================================
// SCALAR NORMALIZERS
// ============================================================================

/// Trimmed text, with "" and the "-" placeholder mapped to None.
///
/// Absence of data is represented as None, never coerced into "0" or "null".
pub fn clean_text(cell: &Data) -> Option<String> {
    let s = match cell {
        Data::Empty => return None,
        Data::String(s) => s.trim().to_string(),
        Data::Int(i) => i.to_string(),
        Data::Float(f) => {
            if f.fract() == 0.0 {
                (*f as i64).to_string()
            } else {
                f.to_string()
            }
        }
        Data::Bool(b) => b.to_string(),
        Data::DateTimeIso(s) => s.clone(),
        Data::DateTime(dt) => dt.to_string(),
        Data::DurationIso(_) | Data::Error(_) => return None,
    };
    if s.is_empty() || s == "-" {
        None
    } else {
        Some(s)
    }
}

/// Brazilian currency value. Never fails - degrades to 0.0.
///
/// Strips the "R$" prefix and whitespace. When a comma is present it is the
/// decimal separator and any "." is thousands grouping, regardless of digit
/// group sizes: "R$ 1.234,50" -> 1234.50. Numeric cells pass through
/// (NaN degrades to 0.0).
pub fn clean_number(cell: &Data) -> f64 {
    match cell {
        Data::Int(i) => *i as f64,
        Data::Float(f) => {
            if f.is_nan() {
                0.0
            } else {
                *f
            }
        }
        Data::String(raw) => {
            let mut s: String = raw.replace("R$", "");
            s.retain(|c| !c.is_whitespace());
            if s.is_empty() || s == "-" {
                return 0.0;
            }
            if s.contains(',') {
                s = s.replace('.', "").replace(',', ".");
            }
            s.parse::<f64>().unwrap_or(0.0)
        }
        _ => 0.0,
    }
}

/// Percentage as a fraction. Never fails - degrades to 0.0.
///
/// Convention (one rule, applied everywhere): string input is a percentage
/// and is divided by 100 ("50,00" or "50%" -> 0.5); native numeric cells are
/// taken as fractions already, since Excel stores percent-formatted cells
/// that way (0.5 -> 0.5).
pub fn clean_percent(cell: &Data) -> f64 {
    match cell {
        Data::Int(i) => *i as f64,
        Data::Float(f) => {
            if f.is_nan() {
                0.0
            } else {
                *f
            }
        }
        Data::String(raw) => {
            let s = raw.replace('%', "").replace(',', ".").trim().to_string();
            if s.is_empty() || s == "-" {
                return 0.0;
            }
            match s.parse::<f64>() {
                Ok(n) => n / 100.0,
                Err(_) => 0.0,
            }
        }
        _ => 0.0,
    }
}

/// Integer cell (ids, counters). None when unparsable or empty.
pub fn clean_int(cell: &Data) -> Option<i64> {
    match cell {
        Data::Int(i) => Some(*i),
        Data::Float(f) => {
            if f.is_nan() {
                None
            } else {
                Some(*f as i64)
            }
        }
        Data::String(s) => {
            let t = s.trim();
            if t.is_empty() || t == "-" {
                return None;
            }
            t.parse::<i64>()
                .ok()
                .or_else(|| t.parse::<f64>().ok().map(|f| f as i64))
        }
        _ => None,
    }
}

/// Calendar date. Accepts native date cells and "DD/MM/YYYY" text.
/// Unparsable or empty input yields None, not an error.
pub fn clean_date(cell: &Data) -> Option<NaiveDate> {
    match cell {
        Data::DateTime(dt) => dt.as_datetime().map(|ndt| ndt.date()),
        Data::DateTimeIso(s) => iso_prefix_date(s),
        Data::String(s) => {
            let s = s.trim();
            if let Some(d) = iso_prefix_date(s) {
                return Some(d);
            }
            let parts: Vec<&str> = s.split('/').collect();
            if parts.len() == 3 {
                let day: u32 = parts[0].trim().parse().ok()?;
                let month: u32 = parts[1].trim().parse().ok()?;
                let year: i32 = parts[2].trim().parse().ok()?;
                return NaiveDate::from_ymd_opt(year, month, day);
            }
            None
        }
        _ => None,
    }
}

/// Competence month, normalized to the first day of the month.
///
/// Accepts native date cells, "YYYY-MM-..." text, "DD/MM/YYYY" and "MM/YYYY".
pub fn clean_competence(cell: &Data) -> Option<NaiveDate> {
    use chrono::Datelike;
    let first_of = |year: i32, month: u32| NaiveDate::from_ymd_opt(year, month, 1);
    match cell {
        Data::DateTime(dt) => {
            let d = dt.as_datetime()?.date();
            first_of(d.year(), d.month())
        }
        Data::DateTimeIso(s) => {
            let d = iso_prefix_date(s)?;
            first_of(d.year(), d.month())
        }
        Data::String(s) => {
            let s = s.trim();
            if let Some(d) = iso_prefix_date(s) {
                return first_of(d.year(), d.month());
            }
            let parts: Vec<&str> = s.split('/').collect();
            match parts.len() {
                // "DD/MM/YYYY"
                3 => {
                    let month: u32 = parts[1].trim().parse().ok()?;
                    let year: i32 = parts[2].trim().parse().ok()?;
                    first_of(year, month)
                }
                // "MM/YYYY"
                2 => {
                    let month: u32 = parts[0].trim().parse().ok()?;
                    let year: i32 = parts[1].trim().parse().ok()?;
                    first_of(year, month)
                }
                _ => None,
            }
        }
        _ => None,
    }
}

/// Parse the "YYYY-MM-DD" prefix of an ISO-ish string ("2026-01-15T00:00:00"
/// included). Strings without the shape return None.
fn iso_prefix_date(s: &str) -> Option<NaiveDate> {
    let bytes = s.as_bytes();
    if bytes.len() < 7 || bytes[4] != b'-' {
        return None;
    }
    let year: i32 = s.get(0..4)?.parse().ok()?;
    let month: u32 = s.get(5..7)?.parse().ok()?;
    let day: u32 = s
        .get(8..10)
        .and_then(|d| d.parse().ok())
        .filter(|_| bytes.get(7) == Some(&b'-'))
        .unwrap_or(1);
    NaiveDate::from_ymd_opt(year, month, day)
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn s(v: &str) -> Data {
        Data::String(v.to_string())
    }

    #[test]
    fn test_fold_strips_accents_and_case() {
        assert_eq!(fold("Mês Ref."), "mes ref.");
        assert_eq!(fold("  Potencial de Movimentação  "), "potencial de movimentacao");
        assert_eq!(fold("Cartões"), "cartoes");
        assert_eq!(fold("Confecção"), "confeccao");
    }

    #[test]
    fn test_find_key_exact_then_folded() {
        let row = vec![
            ("Mês Ref.".to_string(), s("01/2026")),
            ("Empresa".to_string(), s("Acme")),
        ];
        assert_eq!(find_key(&row, "Mês Ref."), Some(&s("01/2026")));
        // Idempotent under re-normalization: accented and plain spellings
        // must resolve to the same cell.
        assert_eq!(find_key(&row, "mes ref."), Some(&s("01/2026")));
        assert_eq!(find_key(&row, "MES REF."), Some(&s("01/2026")));
        assert_eq!(find_key(&row, "Parceiro"), None);
    }

    #[test]
    fn test_find_key_contains_fragment() {
        let row = vec![("Mês Referência".to_string(), s("03/2026"))];
        assert_eq!(find_key_contains(&row, "mes"), Some(&s("03/2026")));
        assert_eq!(find_key_contains(&row, "competencia"), None);
    }

    #[test]
    fn test_missing_key_distinct_from_empty_cell() {
        let row = vec![("Empresa".to_string(), Data::Empty)];
        assert!(find_key(&row, "Empresa").is_some());
        assert!(find_key(&row, "Cidade").is_none());
    }

    #[test]
    fn test_clean_text_placeholders() {
        assert_eq!(clean_text(&s("  Acme  ")), Some("Acme".to_string()));
        assert_eq!(clean_text(&s("-")), None);
        assert_eq!(clean_text(&s("")), None);
        assert_eq!(clean_text(&Data::Empty), None);
        assert_eq!(clean_text(&Data::Int(101)), Some("101".to_string()));
    }

    #[test]
    fn test_clean_number_brazilian_locale() {
        assert_eq!(clean_number(&s("R$ 1.234,50")), 1234.50);
        assert_eq!(clean_number(&s("R$ 1.000,00")), 1000.0);
        assert_eq!(clean_number(&s("1.234.567,89")), 1234567.89);
        assert_eq!(clean_number(&s("250,5")), 250.5);
        // No comma: "." is the decimal separator as-is
        assert_eq!(clean_number(&s("1234.50")), 1234.50);
    }

    #[test]
    fn test_clean_number_degrades_to_zero() {
        assert_eq!(clean_number(&s("")), 0.0);
        assert_eq!(clean_number(&s("-")), 0.0);
        assert_eq!(clean_number(&s("abc")), 0.0);
        assert_eq!(clean_number(&Data::Empty), 0.0);
        assert_eq!(clean_number(&Data::Float(f64::NAN)), 0.0);
    }

    #[test]
    fn test_clean_number_numeric_passthrough() {
        assert_eq!(clean_number(&Data::Float(987.65)), 987.65);
        assert_eq!(clean_number(&Data::Int(42)), 42.0);
    }

    #[test]
    fn test_clean_percent_string_is_divided() {
        assert_eq!(clean_percent(&s("50,00")), 0.5);
        assert_eq!(clean_percent(&s("50%")), 0.5);
        assert_eq!(clean_percent(&s("2,5")), 0.025);
    }

    #[test]
    fn test_clean_percent_numeric_is_fraction() {
        // Excel stores percent-formatted cells as fractions already.
        assert_eq!(clean_percent(&Data::Float(0.5)), 0.5);
        assert_eq!(clean_percent(&Data::Float(f64::NAN)), 0.0);
    }

    #[test]
    fn test_clean_percent_degrades_to_zero() {
        assert_eq!(clean_percent(&s("")), 0.0);
        assert_eq!(clean_percent(&s("-")), 0.0);
        assert_eq!(clean_percent(&Data::Empty), 0.0);
    }

    #[test]
    fn test_clean_int() {
        assert_eq!(clean_int(&s("101")), Some(101));
        assert_eq!(clean_int(&Data::Float(101.0)), Some(101));
        assert_eq!(clean_int(&s("-")), None);
        assert_eq!(clean_int(&s("abc")), None);
        assert_eq!(clean_int(&Data::Empty), None);
    }

    #[test]
    fn test_clean_date_br_format() {
        assert_eq!(
            clean_date(&s("15/03/2025")),
            NaiveDate::from_ymd_opt(2025, 3, 15)
        );
        assert_eq!(clean_date(&s("2025-03-15")), NaiveDate::from_ymd_opt(2025, 3, 15));
        assert_eq!(clean_date(&s("31/02/2025")), None);
        assert_eq!(clean_date(&s("garbage")), None);
        assert_eq!(clean_date(&Data::Empty), None);
    }

    #[test]
    fn test_clean_competence_shapes() {
        let jan = NaiveDate::from_ymd_opt(2026, 1, 1);
        assert_eq!(clean_competence(&s("01/01/2026")), jan);
        assert_eq!(clean_competence(&s("15/01/2026")), jan);
        assert_eq!(clean_competence(&s("01/2026")), jan);
        assert_eq!(clean_competence(&s("2026-01-15")), jan);
        assert_eq!(clean_competence(&s("2026-01")), jan);
        assert_eq!(clean_competence(&s("")), None);
    }
}
