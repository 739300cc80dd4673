pub const SOURCE: &str = "${SOURCE}";
pub const DEST: &str = "${DEST}";
pub const EXT: &str = "${EXT}";

/// Per-file values substituted into a command template
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Bindings {
    pub source: String,
    pub dest: String,
    pub ext: String,
}

impl Bindings {
    pub fn new<S1, S2, S3>(source: S1, dest: S2, ext: S3) -> Self
    where
        S1: Into<String>,
        S2: Into<String>,
        S3: Into<String>,
    {
        Self {
            source: source.into(),
            dest: dest.into(),
            ext: ext.into(),
        }
    }

    /// Replace every placeholder occurrence in one token
    pub fn apply(&self, token: &str) -> String {
        token
            .replace(SOURCE, &self.source)
            .replace(DEST, &self.dest)
            .replace(EXT, &self.ext)
    }
}

/// Expand every token of `template`; tokens without placeholders pass through.
pub fn expand<S: AsRef<str>>(template: &[S], bindings: &Bindings) -> Vec<String> {
    template
        .iter()
        .map(|token| bindings.apply(token.as_ref()))
        .collect()
}
