pub mod nas;
pub mod pool;
pub mod shares;
pub mod targets;
pub mod volume;
pub mod volumes;

/// Print a property as lowercase hex of its bytes, the form the hypervisor
/// integration expects for SCSI identifiers.
pub(crate) fn print_hex(value: &str) {
    println!("{}", hex::encode(value.as_bytes()));
}
