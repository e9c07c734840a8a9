//! Bulk item import from CSV.
//!
//! # Responsibility
//! - Check the header row for required columns before reading any data.
//! - Validate each data row on its own and insert the valid ones.
//! - Produce a template file that passes the structure check.
//!
//! # Invariants
//! - Header matching trims whitespace, ignores case and tolerates a UTF-8
//!   byte-order mark.
//! - Row numbers in reports count the header as row 1.
//! - A failing row never prevents later rows from importing; only storage
//!   faults abort the run.

use crate::model::item::{ItemDraft, MIN_ITEM_NAME_CHARS};
use crate::model::reference::{ReferenceId, ReferenceKind};
use crate::repo::item_repo::ItemRepository;
use crate::repo::reference_repo::ReferenceRepository;
use crate::repo::RepoError;
use log::info;
use std::collections::HashMap;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::io::Read;
use std::path::Path;

pub const REQUIRED_COLUMNS: [&str; 5] = ["name", "type", "rarity", "drop_location", "tier"];
pub const OPTIONAL_COLUMNS: [&str; 1] = ["description"];

const UTF8_BOM: char = '\u{feff}';

pub type ImportResult<T> = Result<T, ImportError>;

#[derive(Debug)]
pub enum ImportError {
    Csv(csv::Error),
    Io(std::io::Error),
    MissingColumns(Vec<String>),
    Repo(RepoError),
}

impl Display for ImportError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Csv(err) => write!(f, "csv read failed: {err}"),
            Self::Io(err) => write!(f, "csv io failed: {err}"),
            Self::MissingColumns(columns) => {
                write!(f, "missing required columns: {}", columns.join(", "))
            }
            Self::Repo(err) => write!(f, "{err}"),
        }
    }
}

impl Error for ImportError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Csv(err) => Some(err),
            Self::Io(err) => Some(err),
            Self::Repo(err) => Some(err),
            Self::MissingColumns(_) => None,
        }
    }
}

impl From<csv::Error> for ImportError {
    fn from(value: csv::Error) -> Self {
        Self::Csv(value)
    }
}

impl From<std::io::Error> for ImportError {
    fn from(value: std::io::Error) -> Self {
        Self::Io(value)
    }
}

impl From<RepoError> for ImportError {
    fn from(value: RepoError) -> Self {
        Self::Repo(value)
    }
}

/// One problem found in one data row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowError {
    pub row: usize,
    pub message: String,
}

impl Display for RowError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "row {}: {}", self.row, self.message)
    }
}

/// Outcome of one import run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImportReport {
    pub success: usize,
    pub failed: usize,
    pub errors: Vec<RowError>,
    pub imported_names: Vec<String>,
}

/// Column positions resolved from the header row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnMap {
    positions: HashMap<String, usize>,
}

impl ColumnMap {
    fn get<'r>(&self, record: &'r csv::StringRecord, column: &str) -> &'r str {
        self.positions
            .get(column)
            .and_then(|index| record.get(*index))
            .map(str::trim)
            .unwrap_or_default()
    }

    pub fn has(&self, column: &str) -> bool {
        self.positions.contains_key(column)
    }
}

fn normalize_header(header: &str) -> String {
    header.trim_start_matches(UTF8_BOM).trim().to_lowercase()
}

/// Resolves header positions, listing every missing required column.
pub fn check_structure(headers: &csv::StringRecord) -> ImportResult<ColumnMap> {
    let mut positions = HashMap::new();
    for (index, header) in headers.iter().enumerate() {
        positions.entry(normalize_header(header)).or_insert(index);
    }

    let missing = REQUIRED_COLUMNS
        .iter()
        .filter(|column| !positions.contains_key(**column))
        .map(|column| column.to_string())
        .collect::<Vec<_>>();
    if !missing.is_empty() {
        return Err(ImportError::MissingColumns(missing));
    }

    Ok(ColumnMap { positions })
}

/// Case-insensitive name -> id lookup for every reference kind, loaded once
/// per run.
struct ReferenceLookup {
    by_kind: HashMap<ReferenceKind, HashMap<String, ReferenceId>>,
}

impl ReferenceLookup {
    fn load(repo: &impl ReferenceRepository) -> ImportResult<Self> {
        let mut by_kind = HashMap::new();
        for kind in ReferenceKind::ALL {
            let names = repo
                .list_references(kind)?
                .into_iter()
                .map(|entry| (entry.name.to_lowercase(), entry.id))
                .collect();
            by_kind.insert(kind, names);
        }
        Ok(Self { by_kind })
    }

    fn resolve(&self, kind: ReferenceKind, name: &str) -> Option<ReferenceId> {
        self.by_kind
            .get(&kind)
            .and_then(|names| names.get(&name.to_lowercase()))
            .copied()
    }
}

fn column_for(kind: ReferenceKind) -> &'static str {
    match kind {
        ReferenceKind::ItemType => "type",
        ReferenceKind::Rarity => "rarity",
        ReferenceKind::DropLocation => "drop_location",
        ReferenceKind::Tier => "tier",
    }
}

/// Imports items from CSV text read from `input`.
pub fn import_items<R, I>(repo: &R, input: I) -> ImportResult<ImportReport>
where
    R: ItemRepository + ReferenceRepository,
    I: Read,
{
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(input);
    let columns = check_structure(reader.headers()?)?;
    let lookup = ReferenceLookup::load(repo)?;

    let mut report = ImportReport::default();
    for (index, record) in reader.records().enumerate() {
        let row = index + 2;
        let record = match record {
            Ok(record) => record,
            Err(err) => {
                report.failed += 1;
                report.errors.push(RowError {
                    row,
                    message: err.to_string(),
                });
                continue;
            }
        };

        match import_row(repo, &columns, &lookup, &record, row)? {
            Ok(name) => {
                report.success += 1;
                report.imported_names.push(name);
            }
            Err(errors) => {
                report.failed += 1;
                report.errors.extend(errors);
            }
        }
    }

    info!(
        "event=csv_import module=import status=ok success={} failed={}",
        report.success, report.failed
    );
    Ok(report)
}

pub fn import_items_from_path<R>(repo: &R, path: &Path) -> ImportResult<ImportReport>
where
    R: ItemRepository + ReferenceRepository,
{
    let file = std::fs::File::open(path)?;
    import_items(repo, file)
}

/// Outer error aborts the run; inner error lists the row's problems.
fn import_row<R>(
    repo: &R,
    columns: &ColumnMap,
    lookup: &ReferenceLookup,
    record: &csv::StringRecord,
    row: usize,
) -> ImportResult<Result<String, Vec<RowError>>>
where
    R: ItemRepository + ReferenceRepository,
{
    let row_error = |message: String| RowError { row, message };
    let mut errors = Vec::new();

    let name = columns.get(record, "name");
    if name.is_empty() {
        errors.push(row_error("item name is missing".to_string()));
    } else if name.chars().count() < MIN_ITEM_NAME_CHARS {
        errors.push(row_error(format!(
            "item name is too short (at least {MIN_ITEM_NAME_CHARS} characters)"
        )));
    }

    let mut ids = HashMap::new();
    for kind in ReferenceKind::ALL {
        let value = columns.get(record, column_for(kind));
        match lookup.resolve(kind, value) {
            Some(id) => {
                ids.insert(kind, id);
            }
            None => errors.push(row_error(format!("unknown {} `{value}`", kind.label()))),
        }
    }

    if !name.is_empty() && repo.is_duplicate_name(name, None)? {
        errors.push(row_error(format!("item `{name}` already exists")));
    }

    if !errors.is_empty() {
        return Ok(Err(errors));
    }

    let id_for = |kind: ReferenceKind| ids.get(&kind).copied().unwrap_or_default();
    let draft = ItemDraft::new(
        name,
        id_for(ReferenceKind::ItemType),
        id_for(ReferenceKind::Rarity),
        id_for(ReferenceKind::DropLocation),
        id_for(ReferenceKind::Tier),
    )
    .with_description(columns.get(record, "description"));

    match repo.create_item(&draft) {
        Ok(_) => Ok(Ok(draft.name.trim().to_string())),
        Err(err) if err.is_storage() => Err(err.into()),
        Err(err) => Ok(Err(vec![row_error(err.to_string())])),
    }
}

/// Example CSV with every supported column, prefixed with a UTF-8 BOM so
/// spreadsheet tools detect the encoding.
pub fn template_csv() -> ImportResult<Vec<u8>> {
    let mut buffer = UTF8_BOM.to_string().into_bytes();
    {
        let mut writer = csv::Writer::from_writer(&mut buffer);
        let mut header = REQUIRED_COLUMNS.to_vec();
        header.extend(OPTIONAL_COLUMNS);
        writer.write_record(&header)?;
        writer.write_record([
            "Flame Sword",
            "Weapon",
            "Legendary",
            "Fire Dungeon",
            "T4",
            "A blade wreathed in fire",
        ])?;
        writer.write_record([
            "Frost Armor",
            "Armor",
            "Epic",
            "Mountain Peak",
            "T3",
            "Armor woven from ice",
        ])?;
        writer.write_record([
            "Lucky Ring",
            "Accessory",
            "Rare",
            "Mystic Forest",
            "T2",
            "Critical rate +15%",
        ])?;
        writer.flush()?;
    }
    Ok(buffer)
}

#[cfg(test)]
mod tests {
    use super::{check_structure, template_csv, ImportError};

    #[test]
    fn structure_check_reports_every_missing_column() {
        let headers = csv::StringRecord::from(vec!["Name", "rarity"]);
        match check_structure(&headers) {
            Err(ImportError::MissingColumns(missing)) => {
                assert_eq!(missing, vec!["type", "drop_location", "tier"]);
            }
            other => panic!("unexpected structure result: {other:?}"),
        }
    }

    #[test]
    fn structure_check_tolerates_bom_case_and_padding() {
        let headers = csv::StringRecord::from(vec![
            "\u{feff}NAME",
            " Type ",
            "Rarity",
            "drop_location",
            "TIER",
        ]);
        let columns = check_structure(&headers).expect("headers should match");
        assert!(columns.has("name"));
        assert!(!columns.has("description"));
    }

    #[test]
    fn template_passes_structure_check() {
        let bytes = template_csv().expect("template");
        assert!(bytes.starts_with("\u{feff}".as_bytes()));

        let mut reader = csv::Reader::from_reader(bytes.as_slice());
        let headers = reader.headers().expect("headers").clone();
        let columns = check_structure(&headers).expect("template headers");
        assert!(columns.has("description"));
        assert_eq!(reader.records().count(), 3);
    }
}
