use std::collections::HashSet;
use std::path::{Path, PathBuf};

use log::debug;

use crate::renderer::RenderError;

pub(crate) fn load_binary(path: &Path) -> Result<Vec<u8>, RenderError> {
    std::fs::read(path).map_err(|err| {
        log::error!("Failed to read {:?}: {}", path, err);
        RenderError::Io(err)
    })
}

pub(crate) fn load_text(path: &Path) -> Result<String, RenderError> {
    let bytes = load_binary(path)?;
    String::from_utf8(bytes).map_err(|err| {
        RenderError::Io(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            format!("{:?} is not valid UTF-8: {}", path, err),
        ))
    })
}

/// Reads a source file, replacing `#include "file"` lines with the named
/// file (resolved relative to the including file). Each file is pulled in
/// at most once; repeated includes expand to nothing.
pub(crate) fn load_with_includes(path: &Path) -> Result<String, RenderError> {
    let mut seen = HashSet::new();
    let mut out = String::new();
    expand_includes(path, &mut seen, &mut out)?;
    Ok(out)
}

fn expand_includes(
    path: &Path,
    seen: &mut HashSet<PathBuf>,
    out: &mut String,
) -> Result<(), RenderError> {
    let identity = std::fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf());
    if !seen.insert(identity) {
        debug!("Skipping repeated include of {:?}", path);
        return Ok(());
    }

    let source = load_text(path)?;
    let dir = path.parent().unwrap_or_else(|| Path::new(""));
    for line in source.lines() {
        match include_target(line) {
            Some(target) => expand_includes(&dir.join(target), seen, out)?,
            None => {
                out.push_str(line);
                out.push('\n');
            }
        }
    }
    Ok(())
}

fn include_target(line: &str) -> Option<&str> {
    let rest = line.trim_start().strip_prefix("#include")?.trim();
    rest.strip_prefix('"')
        .and_then(|r| r.strip_suffix('"'))
        .or_else(|| rest.strip_prefix('<').and_then(|r| r.strip_suffix('>')))
}
