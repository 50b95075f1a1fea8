//! Fixed column layouts of every supported artifact, and header detection.

use crate::types::JobType;

/// Expected header of a job type's staged artifact, in order.
pub fn columns(job_type: JobType) -> &'static [&'static str] {
    match job_type {
        JobType::Customers => &["email", "first_name", "last_name", "city"],
        JobType::Products => &["sku", "name", "price", "quantity"],
        JobType::Orders => &["order_ref", "customer_email", "sku", "quantity"],
        JobType::Backup => &["source_path", "remote_key", "size_bytes"],
    }
}

/// Normalize a raw header cell: strip a UTF-8 BOM, trim, lowercase.
pub fn normalize(cell: &str) -> String {
    cell.trim_start_matches('\u{feff}').trim().to_ascii_lowercase()
}

/// Find the job type whose layout matches `header` exactly (after
/// normalization). Returns `None` when no layout matches.
pub fn detect<S: AsRef<str>>(header: &[S]) -> Option<JobType> {
    let normalized: Vec<String> = header.iter().map(|c| normalize(c.as_ref())).collect();
    JobType::ALL.into_iter().find(|t| {
        let expected = columns(*t);
        expected.len() == normalized.len()
            && expected.iter().zip(&normalized).all(|(e, n)| *e == n.as_str())
    })
}
