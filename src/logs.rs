use std::path::Path;

use anyhow::Result;
use file_rotate::{
    compression::Compression,
    suffix::{AppendTimestamp, FileLimit},
    {ContentLimit, FileRotate},
};
use simplelog::{ConfigBuilder, LevelFilter, WriteLogger};

/// Rolling file logger for the embedded core. The host calls this once with
/// its cache directory; everything in the crate logs through the `log`
/// macros.
pub fn init(cache_dir: &str) -> Result<()> {
    let path = Path::new(cache_dir).join("logs/navigation.log");
    let log = FileRotate::new(
        path,
        AppendTimestamp::default(FileLimit::MaxFiles(3)),
        ContentLimit::Lines(1000),
        Compression::None,
        #[cfg(unix)]
        None,
    );
    let config = ConfigBuilder::new().set_time_format_rfc3339().build();
    WriteLogger::init(LevelFilter::Info, config, log)?;
    Ok(())
}
