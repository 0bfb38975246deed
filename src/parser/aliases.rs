//! Key path mapping: an injectable alias table lets callers rename
//! properties and install virtual backlink shortcuts. Consulted by
//! [`super::builder`] before any schema lookup, so a renamed or shortcut
//! path never has to round-trip through the real property name anywhere
//! else in the builder.

/// A single virtual backlink shortcut target, e.g. `purchasers` standing in
/// for `@links.Person.items`.
#[derive(Debug, Clone)]
pub struct BacklinkShortcut {
	pub class: String,
	pub prop: String,
}

/// An injectable table of property renames and backlink shortcuts. Backlink
/// traversal can additionally be disabled globally, in which case any path
/// that would resolve to `@links.*` (via an explicit `@links.Class.prop`
/// segment or a shortcut expanding to one) is a build error.
#[derive(Debug, Clone)]
pub struct KeyPathMapping {
	display_prefix: Option<String>,
	renames: std::collections::HashMap<String, String>,
	backlink_shortcuts: std::collections::HashMap<String, BacklinkShortcut>,
	backlinks_allowed: bool,
}

impl Default for KeyPathMapping {
	fn default() -> Self {
		Self::new()
	}
}

impl KeyPathMapping {
	pub fn new() -> Self {
		KeyPathMapping {
			display_prefix: None,
			renames: std::collections::HashMap::new(),
			backlink_shortcuts: std::collections::HashMap::new(),
			backlinks_allowed: true,
		}
	}

	/// A prefix prepended to every rendered column name in `describe()`
	/// output when this mapping was registered.
	pub fn with_display_prefix(mut self, prefix: impl Into<String>) -> Self {
		self.display_prefix = Some(prefix.into());
		self
	}

	pub fn display_prefix(&self) -> Option<&str> {
		self.display_prefix.as_deref()
	}

	/// Registers `alias` as a caller-facing rename of the real property
	/// `real_name`.
	pub fn rename(mut self, alias: impl Into<String>, real_name: impl Into<String>) -> Self {
		self.renames.insert(alias.into(), real_name.into());
		self
	}

	/// Registers `alias` as a virtual shortcut for `@links.<class>.<prop>`.
	pub fn backlink_shortcut(mut self, alias: impl Into<String>, class: impl Into<String>, prop: impl Into<String>) -> Self {
		self.backlink_shortcuts.insert(
			alias.into(),
			BacklinkShortcut {
				class: class.into(),
				prop: prop.into(),
			},
		);
		self
	}

	/// Disables backlink traversal globally for this mapping. Any path that
	/// resolves to `@links.*`, directly or via a shortcut, becomes a build
	/// error.
	pub fn disable_backlinks(mut self) -> Self {
		self.backlinks_allowed = false;
		self
	}

	pub fn backlinks_allowed(&self) -> bool {
		self.backlinks_allowed
	}

	/// Resolves a plain field segment to its real property name, following
	/// any registered rename.
	pub fn resolve_field<'a>(&'a self, name: &'a str) -> &'a str {
		self.renames.get(name).map(|s| s.as_str()).unwrap_or(name)
	}

	/// Resolves `name` to a backlink shortcut target, if one was registered.
	pub fn resolve_backlink_shortcut(&self, name: &str) -> Option<&BacklinkShortcut> {
		self.backlink_shortcuts.get(name)
	}
}
