use std::path::{Path, PathBuf};

/// Path of table `number` inside the database directory.
pub fn table_file_name(dbname: &Path, number: u64) -> PathBuf {
    dbname.join(format!("{:06}.ldb", number))
}
