//! Zip bundling of synthesized artifacts.
//!
//! Layout: `nodes/<sanitized>/<iface>.conf`, optional
//! `nodes/<sanitized>/babeld.conf`, `clients/<sanitized>/<iface>.conf`,
//! and `manifest.json` at the root.

use std::io::{Cursor, Write};

use zip::write::SimpleFileOptions;
use zip::ZipWriter;

use crate::error::{Result, TopologyError};
use crate::synth::MeshBundle;

/// Default download filename for generated bundles.
pub const BUNDLE_FILE_NAME: &str = "wg-mesh-config.zip";

/// Bundles a synthesis result into zip bytes.
///
/// # Errors
///
/// Returns `Archive` when writing any entry fails.
pub fn bundle_zip(bundle: &MeshBundle) -> Result<Vec<u8>> {
    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    let options = SimpleFileOptions::default();

    for node in &bundle.nodes {
        let dir = format!("nodes/{}", node.file_name);
        write_entry(
            &mut writer,
            &format!("{dir}/{}", bundle.interface_file),
            node.conf.as_bytes(),
            options,
        )?;
        if let Some(babel) = &node.babel {
            write_entry(&mut writer, &format!("{dir}/babeld.conf"), babel.as_bytes(), options)?;
        }
    }

    for client in &bundle.clients {
        write_entry(
            &mut writer,
            &format!("clients/{}/{}", client.file_name, bundle.interface_file),
            client.conf.as_bytes(),
            options,
        )?;
    }

    let manifest = bundle.manifest.to_json()?;
    write_entry(&mut writer, "manifest.json", manifest.as_bytes(), options)?;

    let cursor = writer
        .finish()
        .map_err(|e| TopologyError::Archive(e.to_string()))?;
    Ok(cursor.into_inner())
}

fn write_entry(
    writer: &mut ZipWriter<Cursor<Vec<u8>>>,
    path: &str,
    bytes: &[u8],
    options: SimpleFileOptions,
) -> Result<()> {
    writer
        .start_file(path, options)
        .map_err(|e| TopologyError::Archive(format!("{path}: {e}")))?;
    writer
        .write_all(bytes)
        .map_err(|e| TopologyError::Archive(format!("{path}: {e}")))?;
    Ok(())
}
