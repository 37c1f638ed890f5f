//! `pool <name> get` / `pool <name> ip`.

use jdss_driver::{JdssDriver, Result};

/// Print `"<total_gb> <free_gb> <used_gb>"`.
pub async fn get(jdss: &JdssDriver) -> Result<()> {
    let (total, free) = jdss.get_pool_stats().await?;
    println!("{} {} {}", total, free, total - free);
    Ok(())
}

/// Print the configured endpoint addresses, one per line.
pub async fn ip(jdss: &JdssDriver) -> Result<()> {
    for host in jdss.hosts() {
        println!("{host}");
    }
    Ok(())
}
