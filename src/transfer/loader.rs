use std::path::Path;

use super::types::TransferRecord;

/// Load a cleaned transfer CSV fully into memory.
///
/// Expected header: chain_id, from_address, to_address, amount, transfer_id,
/// timestamp (unix seconds), token_id.
pub fn load_transfers_csv(path: &Path) -> eyre::Result<Vec<TransferRecord>> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .from_path(path)
        .map_err(|e| eyre::eyre!("Failed to open transfer CSV '{}': {}", path.display(), e))?;

    let mut transfers = Vec::new();
    for (line, result) in reader.deserialize::<TransferRecord>().enumerate() {
        let record = result.map_err(|e| {
            eyre::eyre!(
                "Malformed transfer row {} in '{}': {}",
                line + 2,
                path.display(),
                e
            )
        })?;
        transfers.push(record);
    }

    tracing::info!(
        transfers = transfers.len(),
        path = %path.display(),
        "Loaded transfer stream"
    );
    Ok(transfers)
}

/// Write transfers in the same layout `load_transfers_csv` reads.
pub fn write_transfers_csv<W: std::io::Write>(transfers: &[TransferRecord], writer: W) -> eyre::Result<()> {
    let mut writer = csv::Writer::from_writer(writer);
    for transfer in transfers {
        writer.serialize(transfer)?;
    }
    writer.flush()?;
    Ok(())
}
