use crate::error::{Result, TxError};
use crate::settings::{load_settings, save_settings, settings_path, shellexpand_path};

pub fn run(data_file: Option<String>, limit: Option<i64>) -> Result<()> {
    let mut settings = load_settings();

    if let Some(file) = data_file {
        settings.data_file = shellexpand_path(&file);
    }
    if let Some(limit) = limit {
        if limit <= 0 {
            return Err(TxError::InvalidArgument(format!(
                "rounding limit must be positive, got {limit}"
            )));
        }
        settings.round_up_limit = limit;
    }

    save_settings(&settings)?;
    println!(
        "Saved {} (data file: {}, round-up step: {})",
        settings_path().display(),
        settings.data_file,
        settings.round_up_limit
    );
    Ok(())
}
