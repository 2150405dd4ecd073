// 📥 Seed Import - CSV → store
//
// Idempotent: importing the same file twice inserts nothing the second time.
// Branches are matched by name, instructors by email (or name when the email
// column is empty). Instructor affiliations are `;`-separated branch names and
// are stored as branch ids.

use crate::access::GymAccess;
use crate::entities::{Belt, Branch, Instructor};
use crate::roles::Session;
use anyhow::{anyhow, Context, Result};
use serde::Deserialize;
use std::io::Read;
use std::path::Path;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ImportSummary {
    pub inserted: usize,
    pub skipped: usize,
}

// ============================================================================
// CSV ROWS
// ============================================================================

#[derive(Debug, Deserialize)]
struct BranchRow {
    name: String,
    #[serde(default)]
    address: String,
    #[serde(default)]
    phone: String,
    #[serde(default)]
    hours: String,
    #[serde(default)]
    responsible: String,
    #[serde(default)]
    additional_instructors: String,
}

#[derive(Debug, Deserialize)]
struct InstructorRow {
    name: String,
    #[serde(default)]
    email: String,
    #[serde(default)]
    phone: String,
    #[serde(default)]
    belt: String,
    #[serde(default)]
    stripes: Option<u8>,
    #[serde(default)]
    affiliations: String,
    #[serde(default)]
    bio: String,
    #[serde(default)]
    avatar_url: String,
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(';')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

// ============================================================================
// LOADERS
// ============================================================================

pub fn read_branches<R: Read>(reader: R) -> Result<Vec<Branch>> {
    let mut rdr = csv::Reader::from_reader(reader);
    let mut branches = Vec::new();

    for (line, result) in rdr.deserialize::<BranchRow>().enumerate() {
        let row = result.with_context(|| format!("Failed to parse branch row {}", line + 2))?;
        let mut branch = Branch::new(&row.name, &row.address, &row.phone, &row.hours, &row.responsible);
        branch.additional_instructors = split_list(&row.additional_instructors);
        branches.push(branch);
    }

    Ok(branches)
}

pub fn read_instructors<R: Read>(reader: R) -> Result<Vec<Instructor>> {
    let mut rdr = csv::Reader::from_reader(reader);
    let mut instructors = Vec::new();

    for (line, result) in rdr.deserialize::<InstructorRow>().enumerate() {
        let row = result.with_context(|| format!("Failed to parse instructor row {}", line + 2))?;

        let belt = if row.belt.trim().is_empty() {
            Belt::default()
        } else {
            row.belt
                .parse::<Belt>()
                .map_err(|e| anyhow!("instructor row {}: {}", line + 2, e))?
        };

        let mut instructor = Instructor::new(&row.name, &row.email, belt, row.stripes.unwrap_or(0))
            .with_affiliations(split_list(&row.affiliations));
        instructor.phone = row.phone;
        instructor.bio = row.bio;
        instructor.avatar_url = row.avatar_url;
        instructors.push(instructor);
    }

    Ok(instructors)
}

pub fn load_branches_csv(path: &Path) -> Result<Vec<Branch>> {
    let file = std::fs::File::open(path)
        .with_context(|| format!("Failed to open branches CSV: {:?}", path))?;
    read_branches(file)
}

pub fn load_instructors_csv(path: &Path) -> Result<Vec<Instructor>> {
    let file = std::fs::File::open(path)
        .with_context(|| format!("Failed to open instructors CSV: {:?}", path))?;
    read_instructors(file)
}

// ============================================================================
// IMPORTERS
// ============================================================================

pub fn import_branches(access: &GymAccess, session: &Session, branches: Vec<Branch>) -> Result<ImportSummary> {
    let mut summary = ImportSummary::default();

    for branch in branches {
        if access.find_branch_by_name(session, &branch.name)?.is_some() {
            summary.skipped += 1;
            continue;
        }
        let name = branch.name.clone();
        access
            .create_branch(session, branch)
            .with_context(|| format!("Failed to import branch {:?}", name))?;
        summary.inserted += 1;
    }

    tracing::info!(inserted = summary.inserted, skipped = summary.skipped, "branches imported");
    Ok(summary)
}

pub fn import_instructors(
    access: &GymAccess,
    session: &Session,
    instructors: Vec<Instructor>,
) -> Result<ImportSummary> {
    let mut summary = ImportSummary::default();
    let existing = access.list_instructors(session)?;

    for instructor in instructors {
        let duplicate = existing.iter().any(|known| {
            if instructor.email.is_empty() {
                known.name == instructor.name
            } else {
                known.email.eq_ignore_ascii_case(&instructor.email)
            }
        });
        if duplicate {
            summary.skipped += 1;
            continue;
        }

        let name = instructor.name.clone();
        access
            .create_instructor(session, instructor)
            .with_context(|| format!("Failed to import instructor {:?}", name))?;
        summary.inserted += 1;
    }

    tracing::info!(inserted = summary.inserted, skipped = summary.skipped, "instructors imported");
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use std::sync::Arc;

    const BRANCHES_CSV: &str = "\
name,address,phone,hours,responsible,additional_instructors
Kings BJJ - Centro,\"Rua A, 1\",11999990000,Seg-Sex 9h-21h,Prof. A,Prof. B; Prof. C
Kings BJJ - Sul,\"Rua X, 100\",11999990001,Seg-Sex 9h-21h,Prof. D,
";

    const INSTRUCTORS_CSV: &str = "\
name,email,phone,belt,stripes,affiliations,bio,avatar_url
Prof. A,a@kings.com,1,Preta,3,Kings BJJ - Centro; Kings BJJ - Sul,,
Prof. B,b@kings.com,2,azul,,Kings BJJ - Centro,Competidor,
";

    #[test]
    fn test_read_branches() {
        let branches = read_branches(BRANCHES_CSV.as_bytes()).unwrap();
        assert_eq!(branches.len(), 2);
        assert_eq!(branches[0].address, "Rua A, 1");
        assert_eq!(branches[0].additional_instructors, vec!["Prof. B", "Prof. C"]);
        assert!(branches[1].additional_instructors.is_empty());
    }

    #[test]
    fn test_read_instructors() {
        let instructors = read_instructors(INSTRUCTORS_CSV.as_bytes()).unwrap();
        assert_eq!(instructors.len(), 2);
        assert_eq!(instructors[0].belt, Belt::Preta);
        assert_eq!(instructors[0].stripes, 3);
        assert_eq!(instructors[0].affiliations.len(), 2);
        assert_eq!(instructors[1].belt, Belt::Azul);
        assert_eq!(instructors[1].stripes, 0);
    }

    #[test]
    fn test_unknown_belt_is_an_error() {
        let csv = "name,belt\nProf. X,Black\n";
        let err = read_instructors(csv.as_bytes()).unwrap_err();
        assert!(err.to_string().contains("row 2"));
    }

    #[test]
    fn test_import_twice_is_idempotent() {
        let access = GymAccess::new(Arc::new(MemoryStore::new()));
        let admin = Session::admin();

        let first = import_branches(&access, &admin, read_branches(BRANCHES_CSV.as_bytes()).unwrap()).unwrap();
        let second = import_branches(&access, &admin, read_branches(BRANCHES_CSV.as_bytes()).unwrap()).unwrap();
        assert_eq!(first, ImportSummary { inserted: 2, skipped: 0 });
        assert_eq!(second, ImportSummary { inserted: 0, skipped: 2 });

        let instructors = read_instructors(INSTRUCTORS_CSV.as_bytes()).unwrap();
        let first = import_instructors(&access, &admin, instructors.clone()).unwrap();
        let second = import_instructors(&access, &admin, instructors).unwrap();
        assert_eq!(first.inserted, 2);
        assert_eq!(second.skipped, 2);

        // names were stored as ids
        let index = access.branch_index().unwrap();
        for instructor in access.list_instructors(&admin).unwrap() {
            assert!(instructor.affiliations.iter().all(|r| !index.is_legacy(r)));
        }
    }

    #[test]
    fn test_import_requires_admin() {
        let access = GymAccess::new(Arc::new(MemoryStore::new()));
        let student = Session::resolve(Some("student"));
        let branches = read_branches(BRANCHES_CSV.as_bytes()).unwrap();
        assert!(import_branches(&access, &student, branches).is_err());
    }
}
