//! Sprite and image directive expansion.
//!
//! Rewrites a sprite or image function call into the plain value that
//! replaces it in the output. Arguments may be quoted strings, variables or
//! nested sprite calls; a `$map` argument must name a variable bound by
//! `sprite-map(...)`.

use std::fs;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use globset::GlobBuilder;
use walkdir::WalkDir;

use crate::error::{Result, ScanError, SpriteError, WtError};
use crate::parser::scanner::{parse_call, unquote, SPRITE_FUNCTIONS};
use crate::parser::variables::{Value, VariableTable};

use super::{fingerprint, Frame, PackOptions, PackedSheet, SpriteCache, SpritePacker, SpriteSource};

/// Variables and nested calls resolve at most this deep.
const MAX_DEPTH: usize = 16;

/// Where sprite and image directives read from and write to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpriteConfig {
    /// Images and sprite globs are relative to this directory.
    pub image_dir: PathBuf,
    /// Packed sheets are written here.
    pub gen_dir: PathBuf,
    /// Generated URLs are relative to this directory.
    pub build_dir: PathBuf,
    /// Spacing used when `sprite-map` is not given one.
    pub spacing: u32,
}

/// Replacement text for one directive.
#[derive(Debug, Clone, PartialEq)]
pub struct Expansion {
    pub text: String,
    /// The sheet a `sprite-map` call produced.
    pub sheet: Option<Arc<PackedSheet>>,
}

/// A resolved argument.
enum Arg {
    Text(String),
    Sheet(Arc<PackedSheet>),
}

struct Call<'c> {
    name: &'c str,
    args: &'c [String],
    vars: &'c VariableTable,
    line: u32,
    depth: usize,
}

impl Call<'_> {
    fn malformed(&self, message: impl AsRef<str>) -> WtError {
        ScanError::malformed(self.line, format!("{}(): {}", self.name, message.as_ref())).into()
    }

    fn arity(&self, min: usize, max: usize) -> Result<()> {
        let n = self.args.len();
        if n < min || n > max {
            let expected = if min == max {
                min.to_string()
            } else {
                format!("{} to {}", min, max)
            };
            return Err(self.malformed(format!("expected {} arguments, got {}", expected, n)));
        }
        Ok(())
    }
}

pub struct Expander<'a> {
    config: &'a SpriteConfig,
    cache: &'a SpriteCache,
    packer: &'a dyn SpritePacker,
}

impl<'a> Expander<'a> {
    pub fn new(config: &'a SpriteConfig, cache: &'a SpriteCache, packer: &'a dyn SpritePacker) -> Self {
        Self {
            config,
            cache,
            packer,
        }
    }

    /// Expand a call of one of the sprite functions.
    ///
    /// `indent` is the indentation of the directive's line, used when the
    /// replacement spans several lines.
    pub fn expand(
        &self,
        name: &str,
        args: &[String],
        vars: &VariableTable,
        indent: &str,
        line: u32,
    ) -> Result<Expansion> {
        let call = Call {
            name,
            args,
            vars,
            line,
            depth: 0,
        };
        self.expand_call(&call, indent)
    }

    fn expand_call(&self, call: &Call<'_>, indent: &str) -> Result<Expansion> {
        tracing::trace!(function = call.name, line = call.line, "expanding directive");

        let text = match call.name {
            "sprite-map" => {
                call.arity(1, 2)?;
                let pattern = self.text_arg(call, 0)?;
                let spacing = match call.args.get(1) {
                    Some(_) => {
                        let text = self.text_arg(call, 1)?;
                        parse_px(&text)
                            .and_then(|v| u32::try_from(v).ok())
                            .ok_or_else(|| call.malformed(format!("invalid spacing `{}`", text)))?
                    }
                    None => self.config.spacing,
                };
                let sheet = self.sprite_map(&pattern, spacing)?;
                return Ok(Expansion {
                    text: quote(&self.url_for(&sheet.path)),
                    sheet: Some(sheet),
                });
            }
            "sprite" => {
                call.arity(2, 4)?;
                let sheet = self.sheet_arg(call, 0)?;
                let frame = self.frame_arg(call, &sheet, 1)?;
                let dx = self.offset_arg(call, 2)?;
                let dy = self.offset_arg(call, 3)?;
                format!(
                    "url({}) {} {}",
                    quote(&self.url_for(&sheet.path)),
                    px(shift(call, dx, frame.x)?),
                    px(shift(call, dy, frame.y)?)
                )
            }
            "sprite-url" => {
                call.arity(1, 1)?;
                let sheet = self.sheet_arg(call, 0)?;
                format!("url({})", quote(&self.url_for(&sheet.path)))
            }
            "sprite-position" => {
                call.arity(2, 4)?;
                let sheet = self.sheet_arg(call, 0)?;
                let frame = self.frame_arg(call, &sheet, 1)?;
                let dx = self.offset_arg(call, 2)?;
                let dy = self.offset_arg(call, 3)?;
                format!("{} {}", px(shift(call, dx, frame.x)?), px(shift(call, dy, frame.y)?))
            }
            "sprite-file" => {
                call.arity(2, 2)?;
                let sheet = self.sheet_arg(call, 0)?;
                let frame = self.frame_arg(call, &sheet, 1)?;
                let path = frame.path.strip_prefix(&self.config.image_dir).unwrap_or(&frame.path);
                quote(&slash_path(path))
            }
            "sprite-width" | "sprite-height" => {
                call.arity(2, 2)?;
                let sheet = self.sheet_arg(call, 0)?;
                let frame = self.frame_arg(call, &sheet, 1)?;
                let value = if call.name == "sprite-width" { frame.w } else { frame.h };
                format!("{}px", value)
            }
            "sprite-dimensions" => {
                call.arity(2, 2)?;
                let sheet = self.sheet_arg(call, 0)?;
                let frame = self.frame_arg(call, &sheet, 1)?;
                format!("width: {}px;\n{}height: {}px", frame.w, indent, frame.h)
            }
            "image-url" => {
                call.arity(1, 2)?;
                let path = self.config.image_dir.join(self.text_arg(call, 0)?);
                let url = quote(&self.url_for(&path));
                let only_path = match call.args.get(1) {
                    Some(_) => self.text_arg(call, 1)? == "true",
                    None => false,
                };
                if only_path {
                    url
                } else {
                    format!("url({})", url)
                }
            }
            "image-width" | "image-height" => {
                call.arity(1, 1)?;
                let name = self.text_arg(call, 0)?;
                let path = self.config.image_dir.join(&name);
                if !path.is_file() {
                    return Err(SpriteError::MissingImage { name }.into());
                }
                let (w, h) = image::image_dimensions(&path).map_err(|e| SpriteError::PackFailure {
                    name: name.clone(),
                    message: e.to_string(),
                })?;
                let value = if call.name == "image-width" { w } else { h };
                format!("{}px", value)
            }
            "inline-image" => {
                call.arity(1, 2)?;
                let name = self.text_arg(call, 0)?;
                let path = self.config.image_dir.join(&name);
                let bytes = fs::read(&path).map_err(|_| SpriteError::MissingImage { name: name.clone() })?;
                let mime = match call.args.get(1) {
                    Some(_) => self.text_arg(call, 1)?,
                    None => mime_type(&path).to_string(),
                };
                format!("url(\"data:{};base64,{}\")", mime, STANDARD.encode(bytes))
            }
            other => return Err(call.malformed(format!("{} is not a sprite function", other))),
        };

        Ok(Expansion { text, sheet: None })
    }

    /// Pack (or fetch from the cache) the sheet for images matching `pattern`.
    fn sprite_map(&self, pattern: &str, spacing: u32) -> Result<Arc<PackedSheet>> {
        let sources = self.collect_images(pattern)?;
        if sources.is_empty() {
            return Err(SpriteError::MissingImage {
                name: pattern.to_string(),
            }
            .into());
        }

        let key = fingerprint(pattern, &sources, spacing, &self.config.gen_dir);
        let options = PackOptions {
            spacing,
            out_dir: self.config.gen_dir.clone(),
            file_stem: format!("{}-{}", sheet_stem(pattern), &key[..6]),
        };

        let sheet = self.cache.get_or_pack(&key, || {
            tracing::debug!(pattern, images = sources.len(), sheet = %options.file_stem, "packing sprite sheet");
            self.packer.pack(&sources, &options)
        })?;
        Ok(sheet)
    }

    /// Images under the image directory matching `pattern`, sorted by path.
    fn collect_images(&self, pattern: &str) -> Result<Vec<SpriteSource>> {
        let matcher = GlobBuilder::new(pattern)
            .literal_separator(true)
            .build()
            .map_err(|e| SpriteError::PackFailure {
                name: pattern.to_string(),
                message: e.to_string(),
            })?
            .compile_matcher();

        let mut sources = Vec::new();
        for entry in WalkDir::new(&self.config.image_dir)
            .follow_links(true)
            .sort_by_file_name()
            .into_iter()
            .filter_map(|e| e.ok())
        {
            if !entry.file_type().is_file() {
                continue;
            }
            let Ok(relative) = entry.path().strip_prefix(&self.config.image_dir) else {
                continue;
            };
            if !matcher.is_match(relative) {
                continue;
            }
            let name = relative
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_default();
            sources.push(SpriteSource {
                name,
                path: entry.path().to_path_buf(),
            });
        }
        Ok(sources)
    }

    fn resolve(&self, raw: &str, call: &Call<'_>, depth: usize) -> Result<Arg> {
        if depth > MAX_DEPTH {
            return Err(call.malformed("arguments nest too deeply"));
        }
        let raw = raw.trim();

        if let Some(var) = raw.strip_prefix('$') {
            if !var.is_empty() && var.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'_' || b == b'-') {
                return match call.vars.get(var) {
                    Some(Value::SpriteMap(sheet)) => Ok(Arg::Sheet(Arc::clone(sheet))),
                    Some(Value::Raw(value)) => self.resolve(value, call, depth + 1),
                    None => Err(call.malformed(format!("undefined variable ${}", var))),
                };
            }
        }

        if let Some((name, args)) = parse_call(raw) {
            if SPRITE_FUNCTIONS.contains(&name) {
                let nested = Call {
                    name,
                    args: &args,
                    vars: call.vars,
                    line: call.line,
                    depth: depth + 1,
                };
                let expansion = self.expand_call(&nested, "")?;
                return Ok(match expansion.sheet {
                    Some(sheet) => Arg::Sheet(sheet),
                    None => Arg::Text(unquote(&expansion.text).to_string()),
                });
            }
        }

        Ok(Arg::Text(unquote(raw).to_string()))
    }

    fn arg(&self, call: &Call<'_>, index: usize) -> Result<Arg> {
        let raw = call
            .args
            .get(index)
            .ok_or_else(|| call.malformed(format!("missing argument {}", index + 1)))?;
        self.resolve(raw, call, call.depth)
    }

    fn text_arg(&self, call: &Call<'_>, index: usize) -> Result<String> {
        match self.arg(call, index)? {
            Arg::Text(text) => Ok(text),
            Arg::Sheet(sheet) => Ok(self.url_for(&sheet.path)),
        }
    }

    fn sheet_arg(&self, call: &Call<'_>, index: usize) -> Result<Arc<PackedSheet>> {
        match self.arg(call, index)? {
            Arg::Sheet(sheet) => Ok(sheet),
            Arg::Text(_) => Err(call.malformed(format!(
                "{} is not a sprite map",
                call.args.get(index).map_or("", String::as_str)
            ))),
        }
    }

    fn frame_arg<'s>(&self, call: &Call<'_>, sheet: &'s PackedSheet, index: usize) -> Result<&'s Frame> {
        let name = self.text_arg(call, index)?;
        sheet
            .frame(&name)
            .ok_or_else(|| SpriteError::MissingImage { name }.into())
    }

    fn offset_arg(&self, call: &Call<'_>, index: usize) -> Result<i64> {
        if call.args.get(index).is_none() {
            return Ok(0);
        }
        let text = self.text_arg(call, index)?;
        parse_px(&text).ok_or_else(|| call.malformed(format!("invalid offset `{}`", text)))
    }

    /// URL of `path` relative to the build directory.
    fn url_for(&self, path: &Path) -> String {
        slash_path(&relative_path(&self.config.build_dir, path))
    }
}

fn quote(text: &str) -> String {
    format!("\"{}\"", text)
}

/// Pixel value for CSS; zero is written without a unit.
fn px(value: i64) -> String {
    if value == 0 {
        "0".to_string()
    } else {
        format!("{}px", value)
    }
}

/// Background offset of a frame at `at` moved by `by` pixels.
fn shift(call: &Call<'_>, by: i64, at: u32) -> Result<i64> {
    by.checked_sub(i64::from(at))
        .ok_or_else(|| call.malformed(format!("offset {}px is out of range", by)))
}

fn parse_px(text: &str) -> Option<i64> {
    let text = text.trim();
    text.strip_suffix("px").unwrap_or(text).trim().parse().ok()
}

/// Sheet file name prefix: the directory part of the glob, if it has one.
fn sheet_stem(pattern: &str) -> String {
    Path::new(pattern)
        .parent()
        .and_then(|p| p.file_name())
        .map(|s| s.to_string_lossy().into_owned())
        .filter(|s| !s.is_empty() && !s.contains(['*', '?', '[', '{']))
        .unwrap_or_else(|| "sprite".to_string())
}

fn mime_type(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .map(|e| e.to_string_lossy().to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "png" => "image/png",
        "gif" => "image/gif",
        "jpg" | "jpeg" => "image/jpeg",
        "svg" => "image/svg+xml",
        "webp" => "image/webp",
        "ico" => "image/x-icon",
        _ => "application/octet-stream",
    }
}

/// Lexical path from directory `from` to `to`.
fn relative_path(from: &Path, to: &Path) -> PathBuf {
    let from: Vec<Component> = from.components().collect();
    let to: Vec<Component> = to.components().collect();
    let common = from.iter().zip(&to).take_while(|(a, b)| a == b).count();

    let mut path = PathBuf::new();
    for _ in common..from.len() {
        path.push("..");
    }
    for component in &to[common..] {
        path.push(component.as_os_str());
    }
    path
}

fn slash_path(path: &Path) -> String {
    path.components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::scanner::AssignFlags;
    use image::{Rgba, RgbaImage};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::{tempdir, TempDir};

    /// Packs every image into one row without touching the filesystem.
    struct RowPacker {
        calls: AtomicUsize,
    }

    impl SpritePacker for RowPacker {
        fn pack(&self, images: &[SpriteSource], options: &PackOptions) -> std::result::Result<PackedSheet, SpriteError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let frames = images
                .iter()
                .enumerate()
                .map(|(i, source)| Frame {
                    name: source.name.clone(),
                    path: source.path.clone(),
                    x: i as u32 * (10 + options.spacing),
                    y: 0,
                    w: 10,
                    h: 20,
                })
                .collect();
            Ok(PackedSheet {
                path: options.out_dir.join(format!("{}.png", options.file_stem)),
                size: (10 * images.len() as u32, 20),
                frames,
            })
        }
    }

    struct Fixture {
        dir: TempDir,
        config: SpriteConfig,
        cache: SpriteCache,
        packer: RowPacker,
    }

    impl Fixture {
        fn new() -> Self {
            let dir = tempdir().unwrap();
            let images = dir.path().join("images");
            fs::create_dir_all(images.join("icons")).unwrap();
            for name in ["home", "search"] {
                RgbaImage::from_pixel(3, 5, Rgba([1, 2, 3, 255]))
                    .save(images.join("icons").join(format!("{}.png", name)))
                    .unwrap();
            }
            let config = SpriteConfig {
                image_dir: images,
                gen_dir: dir.path().join("gen"),
                build_dir: dir.path().join("css"),
                spacing: 0,
            };
            Fixture {
                dir,
                config,
                cache: SpriteCache::new(),
                packer: RowPacker {
                    calls: AtomicUsize::new(0),
                },
            }
        }

        fn expander(&self) -> Expander<'_> {
            Expander::new(&self.config, &self.cache, &self.packer)
        }
    }

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    fn bound_vars(fixture: &Fixture) -> VariableTable {
        let expansion = fixture
            .expander()
            .expand("sprite-map", &args(&["\"icons/*.png\""]), &VariableTable::new(), "", 1)
            .unwrap();
        let mut vars = VariableTable::new();
        vars.assign(
            "icons",
            Value::SpriteMap(expansion.sheet.unwrap()),
            AssignFlags::default(),
        );
        vars
    }

    #[test]
    fn test_sprite_map_packs_and_names_sheet() {
        let fixture = Fixture::new();
        let expansion = fixture
            .expander()
            .expand("sprite-map", &args(&["\"icons/*.png\""]), &VariableTable::new(), "", 1)
            .unwrap();

        let sheet = expansion.sheet.unwrap();
        let names: Vec<_> = sheet.frames.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["home", "search"]);

        let stem = sheet.path.file_stem().unwrap().to_string_lossy().into_owned();
        assert!(stem.starts_with("icons-"), "{}", stem);
        assert_eq!(stem.len(), "icons-".len() + 6);
        assert_eq!(expansion.text, format!("\"../gen/{}.png\"", stem));
    }

    #[test]
    fn test_sprite_map_is_cached() {
        let fixture = Fixture::new();
        let vars = VariableTable::new();
        for _ in 0..3 {
            fixture
                .expander()
                .expand("sprite-map", &args(&["\"icons/*.png\""]), &vars, "", 1)
                .unwrap();
        }
        assert_eq!(fixture.packer.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_empty_glob_is_missing_image() {
        let fixture = Fixture::new();
        let err = fixture
            .expander()
            .expand("sprite-map", &args(&["\"nothing/*.png\""]), &VariableTable::new(), "", 1)
            .unwrap_err();
        assert!(matches!(err, WtError::Sprite(SpriteError::MissingImage { .. })));
    }

    #[test]
    fn test_sprite_and_position() {
        let fixture = Fixture::new();
        let vars = bound_vars(&fixture);
        let expander = fixture.expander();

        let sprite = expander
            .expand("sprite", &args(&["$icons", "search"]), &vars, "", 4)
            .unwrap();
        assert!(sprite.text.starts_with("url(\"../gen/icons-"));
        assert!(sprite.text.ends_with(".png\") -10px 0"), "{}", sprite.text);

        let position = expander
            .expand("sprite-position", &args(&["$icons", "\"search\"", "2px", "3"]), &vars, "", 4)
            .unwrap();
        assert_eq!(position.text, "-8px 3px");
    }

    #[test]
    fn test_extreme_offset_is_malformed() {
        let fixture = Fixture::new();
        let vars = bound_vars(&fixture);
        let err = fixture
            .expander()
            .expand("sprite-position", &args(&["$icons", "search", "-9223372036854775808px"]), &vars, "", 3)
            .unwrap_err();
        assert!(matches!(err, WtError::Scan(ScanError::MalformedDirective { line: 3, .. })), "{:?}", err);
    }

    #[test]
    fn test_sprite_dimensions_uses_indent() {
        let fixture = Fixture::new();
        let vars = bound_vars(&fixture);
        let expansion = fixture
            .expander()
            .expand("sprite-dimensions", &args(&["$icons", "home"]), &vars, "    ", 2)
            .unwrap();
        assert_eq!(expansion.text, "width: 10px;\n    height: 20px");
    }

    #[test]
    fn test_sprite_file_and_sizes() {
        let fixture = Fixture::new();
        let vars = bound_vars(&fixture);
        let expander = fixture.expander();

        let file = expander
            .expand("sprite-file", &args(&["$icons", "home"]), &vars, "", 1)
            .unwrap();
        assert_eq!(file.text, "\"icons/home.png\"");

        let width = expander
            .expand("sprite-width", &args(&["$icons", "home"]), &vars, "", 1)
            .unwrap();
        assert_eq!(width.text, "10px");

        // Nested call: the real image is 3x5.
        let nested = expander
            .expand("image-height", &args(&["sprite-file($icons, home)"]), &vars, "", 1)
            .unwrap();
        assert_eq!(nested.text, "5px");
    }

    #[test]
    fn test_unknown_sprite_name_is_missing_image() {
        let fixture = Fixture::new();
        let vars = bound_vars(&fixture);
        let err = fixture
            .expander()
            .expand("sprite", &args(&["$icons", "ghost"]), &vars, "", 1)
            .unwrap_err();
        match err {
            WtError::Sprite(SpriteError::MissingImage { name }) => assert_eq!(name, "ghost"),
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_undefined_map_is_malformed() {
        let fixture = Fixture::new();
        let err = fixture
            .expander()
            .expand("sprite-url", &args(&["$nope"]), &VariableTable::new(), "", 7)
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "malformed directive on line 7: sprite-url(): undefined variable $nope"
        );
    }

    #[test]
    fn test_image_functions() {
        let fixture = Fixture::new();
        let vars = VariableTable::new();
        let expander = fixture.expander();

        let url = expander
            .expand("image-url", &args(&["\"icons/home.png\""]), &vars, "", 1)
            .unwrap();
        assert_eq!(url.text, "url(\"../images/icons/home.png\")");

        let width = expander
            .expand("image-width", &args(&["'icons/home.png'"]), &vars, "", 1)
            .unwrap();
        assert_eq!(width.text, "3px");

        let inline = expander
            .expand("inline-image", &args(&["\"icons/home.png\""]), &vars, "", 1)
            .unwrap();
        assert!(inline.text.starts_with("url(\"data:image/png;base64,iVBORw0KGgo"));

        let missing = expander
            .expand("image-width", &args(&["\"nope.png\""]), &vars, "", 1)
            .unwrap_err();
        assert!(matches!(missing, WtError::Sprite(SpriteError::MissingImage { .. })));
        assert!(fixture.dir.path().exists());
    }

    #[test]
    fn test_undecodable_image_is_sprite_error() {
        let fixture = Fixture::new();
        fs::write(fixture.config.image_dir.join("broken.png"), b"not a png").unwrap();

        let err = fixture
            .expander()
            .expand("image-height", &args(&["\"broken.png\""]), &VariableTable::new(), "", 1)
            .unwrap_err();
        match err {
            WtError::Sprite(SpriteError::PackFailure { name, .. }) => assert_eq!(name, "broken.png"),
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_variable_holding_path() {
        let fixture = Fixture::new();
        let mut vars = VariableTable::new();
        vars.assign(
            "logo",
            Value::Raw("\"icons/search.png\"".to_string()),
            AssignFlags::default(),
        );
        let url = fixture
            .expander()
            .expand("image-url", &args(&["$logo"]), &vars, "", 1)
            .unwrap();
        assert_eq!(url.text, "url(\"../images/icons/search.png\")");
    }

    #[test]
    fn test_wrong_arity() {
        let fixture = Fixture::new();
        let err = fixture
            .expander()
            .expand("sprite-url", &args(&[]), &VariableTable::new(), "", 2)
            .unwrap_err();
        assert!(err.to_string().contains("expected 1 arguments, got 0"));
    }

    #[test]
    fn test_helpers() {
        assert_eq!(px(0), "0");
        assert_eq!(px(-12), "-12px");
        assert_eq!(parse_px(" 4px "), Some(4));
        assert_eq!(parse_px("-3"), Some(-3));
        assert_eq!(parse_px("wide"), None);
        assert_eq!(sheet_stem("icons/*.png"), "icons");
        assert_eq!(sheet_stem("*.png"), "sprite");
        assert_eq!(
            relative_path(Path::new("/a/css"), Path::new("/a/gen/s.png")),
            PathBuf::from("../gen/s.png")
        );
    }
}
