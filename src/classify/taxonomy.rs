// Class taxonomy
// Canonical, sorted list of scored SNOMED CT codes

use std::collections::{BTreeSet, HashMap};
use std::fs;
use std::path::Path;

use crate::classify::label_space::LabelSpaceError;

/// Column holding the class codes in the mapping table
pub const CODE_COLUMN: &str = "SNOMED CT Code";

/// Column holding short class names, when present
pub const ABBREVIATION_COLUMN: &str = "Abbreviation";

/// Codes scored as equivalent to another class; never emitted
pub const EQUIVALENT_CLASSES: [&str; 3] = ["59118001", "63593006", "17338001"];

/// Scored classes of the mapping table: (code, abbreviation)
pub const SCORED_CLASSES: [(&str, &str); 27] = [
    ("270492004", "IAVB"),
    ("164889003", "AF"),
    ("164890007", "AFL"),
    ("426627000", "Brady"),
    ("713427006", "CRBBB"),
    ("713426002", "IRBBB"),
    ("445118002", "LAnFB"),
    ("39732003", "LAD"),
    ("164909002", "LBBB"),
    ("251146004", "LQRSV"),
    ("698252002", "NSIVCB"),
    ("10370003", "PR"),
    ("284470004", "PAC"),
    ("427172004", "PVC"),
    ("164947007", "LPR"),
    ("111975006", "LQT"),
    ("164917005", "QAb"),
    ("47665007", "RAD"),
    ("59118001", "RBBB"),
    ("427393009", "SA"),
    ("426177001", "SB"),
    ("426783006", "NSR"),
    ("427084000", "STach"),
    ("63593006", "SVPB"),
    ("164934002", "TAb"),
    ("59931005", "TInv"),
    ("17338001", "VPB"),
];

/// Ordered class codes; position `i` is class `i` of every score vector
#[derive(Debug, Clone, PartialEq)]
pub struct ClassTaxonomy {
    classes: Vec<String>,
    abbreviations: HashMap<String, String>,
}

impl ClassTaxonomy {
    /// Build from raw codes: deduplicate, drop equivalents, sort
    pub fn from_codes<I, S>(codes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let unique: BTreeSet<String> = codes
            .into_iter()
            .map(Into::into)
            .map(|code| code.trim().to_string())
            .filter(|code| !code.is_empty() && !EQUIVALENT_CLASSES.contains(&code.as_str()))
            .collect();

        ClassTaxonomy {
            classes: unique.into_iter().collect(),
            abbreviations: HashMap::new(),
        }
    }

    /// Taxonomy of the built-in scored class table
    pub fn builtin() -> Self {
        let mut taxonomy = Self::from_codes(SCORED_CLASSES.iter().map(|(code, _)| *code));
        taxonomy.abbreviations = SCORED_CLASSES
            .iter()
            .map(|(code, abbr)| (code.to_string(), abbr.to_string()))
            .collect();
        taxonomy
    }

    /// Parse a mapping table in CSV form
    pub fn from_csv_str(text: &str) -> Result<Self, LabelSpaceError> {
        let mut lines = text.lines().filter(|line| !line.trim().is_empty());

        let header = lines
            .next()
            .ok_or_else(|| LabelSpaceError::Taxonomy("mapping table is empty".to_string()))?;
        let columns = split_csv_line(header);

        let code_index = column_index(&columns, CODE_COLUMN)
            .ok_or_else(|| LabelSpaceError::Taxonomy(format!("missing '{}' column", CODE_COLUMN)))?;
        let abbreviation_index = column_index(&columns, ABBREVIATION_COLUMN);

        let mut codes = Vec::new();
        let mut abbreviations = HashMap::new();
        for (row, line) in lines.enumerate() {
            let fields = split_csv_line(line);
            let code = fields.get(code_index).ok_or_else(|| {
                LabelSpaceError::Taxonomy(format!("row {} has no '{}' field", row + 1, CODE_COLUMN))
            })?;
            let code = code.trim().to_string();

            if let Some(abbr) = abbreviation_index.and_then(|i| fields.get(i)) {
                abbreviations.insert(code.clone(), abbr.trim().to_string());
            }
            codes.push(code);
        }

        let mut taxonomy = Self::from_codes(codes);
        taxonomy.abbreviations = abbreviations;
        Ok(taxonomy)
    }

    /// Load a mapping table from disk
    pub fn from_csv_file(path: &Path) -> Result<Self, LabelSpaceError> {
        let text = fs::read_to_string(path)?;
        let taxonomy = Self::from_csv_str(&text)?;
        log::debug!("Loaded {} classes from {:?}", taxonomy.len(), path);
        Ok(taxonomy)
    }

    pub fn classes(&self) -> &[String] {
        &self.classes
    }

    pub fn len(&self) -> usize {
        self.classes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }

    /// Position of a code in the canonical order
    pub fn index_of(&self, code: &str) -> Option<usize> {
        self.classes.binary_search_by(|c| c.as_str().cmp(code)).ok()
    }

    /// Short name of a code, if the table provided one
    pub fn abbreviation(&self, code: &str) -> Option<&str> {
        self.abbreviations.get(code).map(String::as_str)
    }
}

fn column_index(columns: &[String], name: &str) -> Option<usize> {
    columns.iter().position(|c| c.trim() == name)
}

/// Split one CSV record, honouring double-quoted fields and `""` escapes
fn split_csv_line(line: &str) -> Vec<String> {
    let mut fields = Vec::new();
    let mut field = String::new();
    let mut in_quotes = false;
    let mut chars = line.trim_end_matches('\r').chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '"' if in_quotes => {
                if chars.peek() == Some(&'"') {
                    field.push('"');
                    chars.next();
                } else {
                    in_quotes = false;
                }
            }
            '"' => in_quotes = true,
            ',' if !in_quotes => fields.push(std::mem::take(&mut field)),
            _ => field.push(c),
        }
    }
    fields.push(field);

    fields
}
