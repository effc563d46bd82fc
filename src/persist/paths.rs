//! Deterministic output naming. The completion tracker and the persistence
//! engine both derive paths from here, so a later run always looks exactly
//! where an earlier run wrote.

use std::path::{Path, PathBuf};

use crate::config::FileOptions;
use crate::persist::format::SIDECAR_EXTENSION;
use crate::traits::InputRecord;

/// Expands a printf-style name template: `%s` becomes `base`, `%%` a literal `%`.
/// Any other `%` sequence is kept as written.
pub fn render_template(template: &str, base: &str) -> String {
    let mut out = String::with_capacity(template.len() + base.len());
    let mut chars = template.chars().peekable();
    while let Some(c) = chars.next() {
        if c != '%' {
            out.push(c);
            continue;
        }
        match chars.peek() {
            Some('s') => {
                chars.next();
                out.push_str(base);
            }
            Some('%') => {
                chars.next();
                out.push('%');
            }
            _ => out.push('%'),
        }
    }
    out
}

/// Every path one record's outputs live at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputPaths {
    pub dir: PathBuf,
    pub artifact: PathBuf,
    /// Only sequential-image formats have a sidecar.
    pub sidecar: Option<PathBuf>,
    pub preview: PathBuf,
}

impl OutputPaths {
    pub fn resolve(input: &InputRecord, file: &FileOptions) -> Self {
        let dir = match &file.output_path {
            Some(root) => root.join(&input.relative_dir),
            None => input
                .input_path
                .parent()
                .map(Path::to_path_buf)
                .unwrap_or_default(),
        };

        let stem = render_template(&file.output_name_template, &input.base_name);
        let artifact = dir.join(format!("{}.{}", stem, file.format.extension()));
        let sidecar = file
            .format
            .is_sequential()
            .then(|| dir.join(format!("{}.{}", stem, SIDECAR_EXTENSION)));
        let thumb = render_template(&file.thumb_name_template, &input.base_name);
        let preview = dir.join(format!("{}.png", thumb));

        Self {
            dir,
            artifact,
            sidecar,
            preview,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::OutputFormat;

    #[test]
    fn test_render_template_substitutes_and_escapes() {
        assert_eq!(render_template("%s__Decoded", "IMG_1"), "IMG_1__Decoded");
        assert_eq!(render_template("100%%_%s", "a"), "100%_a");
        assert_eq!(render_template("%d-%s%", "a"), "%d-a%");
    }

    #[test]
    fn test_default_paths_sit_next_to_the_input() {
        let input = InputRecord::from_path("/data/raw/IMG_7.LFR");
        let paths = OutputPaths::resolve(&input, &FileOptions::default());
        assert_eq!(paths.dir, PathBuf::from("/data/raw"));
        assert_eq!(paths.artifact, PathBuf::from("/data/raw/IMG_7__Decoded.lfb"));
        assert_eq!(paths.sidecar, None);
        assert_eq!(
            paths.preview,
            PathBuf::from("/data/raw/IMG_7__Decoded_Thumb.png")
        );
    }

    #[test]
    fn test_output_root_mirrors_relative_dir_and_sequential_gets_sidecar() {
        let input = InputRecord::from_path("/data/raw/day1/IMG_7.LFR").with_relative_dir("day1");
        let file = FileOptions {
            output_path: Some(PathBuf::from("/out")),
            format: OutputFormat::PngAlpha,
            ..Default::default()
        };
        let paths = OutputPaths::resolve(&input, &file);
        assert_eq!(paths.artifact, PathBuf::from("/out/day1/IMG_7__Decoded.png"));
        assert_eq!(
            paths.sidecar,
            Some(PathBuf::from("/out/day1/IMG_7__Decoded.json"))
        );
    }
}
