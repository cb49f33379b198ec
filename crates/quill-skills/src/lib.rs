//! Skills extension — discovers `SKILL.md` bundles from standard locations
//! and registers each as a dynamic tool the agent can invoke to pull
//! specialized instructions into context.
//!
//! A skill is a directory holding a `SKILL.md` file: YAML frontmatter
//! between `---` markers, then a markdown body. Discovery walks, in
//! priority order (lowest to highest):
//!
//! 1. `$XDG_CONFIG_HOME/quill/skills` (fallback `~/.config/quill/skills`)
//! 2. `~/.quill/skills`
//! 3. `<working dir>/.quill/skills`
//!
//! On tool-name collisions the later (higher-priority) skill wins.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use quill_core::tool::{ToolCall, ToolDescriptor, ToolResponse};
use quill_extensions::{Extension, ExtensionContext, ExtensionInfo, ExtensionTool, HookSet};

/// Reserved prefix for skill tool names.
pub const TOOL_NAME_PREFIX: &str = "skills_";

const SKILL_FILE_NAME: &str = "SKILL.md";
const MIN_DESCRIPTION_LEN: usize = 20;

/// YAML frontmatter of a `SKILL.md` file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkillFrontmatter {
    pub name: String,
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub license: Option<String>,
    #[serde(
        rename = "allowed-tools",
        default,
        skip_serializing_if = "Vec::is_empty"
    )]
    pub allowed_tools: Vec<String>,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub metadata: HashMap<String, String>,
}

/// A parsed skill. Immutable after discovery.
#[derive(Debug, Clone, PartialEq)]
pub struct Skill {
    /// Skill name; always equals the basename of `dir`.
    pub name: String,
    /// The directory containing the `SKILL.md`.
    pub dir: PathBuf,
    /// The `SKILL.md` file itself.
    pub path: PathBuf,
    /// Generated tool name (`skills_` + sanitized relative path).
    pub tool_name: String,
    pub description: String,
    /// Markdown body with surrounding whitespace trimmed.
    pub content: String,
    pub license: Option<String>,
    /// Advisory tool allow-list; parsed but not enforced by the runtime.
    pub allowed_tools: Vec<String>,
    pub metadata: HashMap<String, String>,
}

/// Built-in extension surfacing discovered skills as tools.
pub struct SkillsExtension {
    /// Override for the discovery roots; `None` means the standard
    /// locations derived from the working directory.
    roots: Option<Vec<PathBuf>>,
    skills: OnceLock<Vec<Skill>>,
}

impl SkillsExtension {
    pub fn new() -> Self {
        Self {
            roots: None,
            skills: OnceLock::new(),
        }
    }

    /// Discover skills from explicit roots instead of the standard
    /// locations. Roots are walked in the given order; later roots win
    /// name collisions.
    pub fn with_roots(roots: Vec<PathBuf>) -> Self {
        Self {
            roots: Some(roots),
            skills: OnceLock::new(),
        }
    }

    /// The skills discovered during `init`.
    pub fn skills(&self) -> &[Skill] {
        self.skills.get().map(Vec::as_slice).unwrap_or_default()
    }
}

impl Default for SkillsExtension {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Extension for SkillsExtension {
    fn info(&self) -> ExtensionInfo {
        ExtensionInfo {
            name: "quill-skills".into(),
            version: env!("CARGO_PKG_VERSION").into(),
            description: "Discovers SKILL.md bundles and registers them as dynamic tools".into(),
            author: "Quill".into(),
        }
    }

    async fn init(&self, ctx: &ExtensionContext) -> anyhow::Result<()> {
        let roots = match &self.roots {
            Some(roots) => roots.clone(),
            None => skill_base_paths(&ctx.working_dir),
        };

        let skills = discover_skills(&roots);
        if !skills.is_empty() {
            info!(count = skills.len(), "Skills loaded");
            for skill in &skills {
                debug!(tool = %skill.tool_name, path = %skill.path.display(), "Registered skill");
            }
        }

        let _ = self.skills.set(skills);
        Ok(())
    }

    fn hooks(&self) -> HookSet {
        HookSet::new()
    }

    async fn shutdown(&self) -> anyhow::Result<()> {
        Ok(())
    }

    fn tools(&self) -> Vec<Arc<dyn ExtensionTool>> {
        self.skills()
            .iter()
            .map(|skill| Arc::new(SkillTool::new(skill.clone())) as Arc<dyn ExtensionTool>)
            .collect()
    }
}

/// Dynamic tool backed by one skill.
struct SkillTool {
    skill: Skill,
}

impl SkillTool {
    fn new(skill: Skill) -> Self {
        Self { skill }
    }
}

#[async_trait]
impl ExtensionTool for SkillTool {
    fn info(&self) -> ToolDescriptor {
        ToolDescriptor {
            name: self.skill.tool_name.clone(),
            description: self.skill.description.clone(),
            parameters: serde_json::json!({"type": "object", "properties": {}}),
            required: vec![],
        }
    }

    async fn run(&self, _call: ToolCall) -> anyhow::Result<ToolResponse> {
        // Parameters are ignored; invoking the tool loads the skill.
        let output = format!(
            "Launching skill: {}\n\nBase directory for this skill: {}\n\n{}",
            self.skill.name,
            self.skill.dir.display(),
            self.skill.content,
        );
        Ok(ToolResponse::text(output))
    }
}

/// Discovery roots in priority order (lowest to highest).
pub fn skill_base_paths(working_dir: &Path) -> Vec<PathBuf> {
    let mut paths = Vec::new();

    let config_dir = std::env::var_os("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .or_else(|| dirs::home_dir().map(|home| home.join(".config")));
    if let Some(config_dir) = config_dir {
        paths.push(config_dir.join("quill").join("skills"));
    }

    if let Some(home) = dirs::home_dir() {
        paths.push(home.join(".quill").join("skills"));
    }

    paths.push(working_dir.join(".quill").join("skills"));
    paths
}

/// Walk the given roots, in order, collecting valid skills.
///
/// Missing roots are silently skipped; unparseable skills are warned about
/// and skipped. Tool-name collisions keep the later skill, which makes
/// higher-priority roots win.
pub fn discover_skills(roots: &[PathBuf]) -> Vec<Skill> {
    let mut skills: Vec<Skill> = Vec::new();
    let mut seen: HashMap<String, PathBuf> = HashMap::new();

    for root in roots {
        if !root.exists() {
            continue;
        }

        for entry in WalkDir::new(root)
            .sort_by_file_name()
            .into_iter()
            .filter_map(|e| e.ok())
        {
            if !entry.file_type().is_file() || entry.file_name() != SKILL_FILE_NAME {
                continue;
            }

            let skill = match parse_skill_file(entry.path()) {
                Ok(skill) => skill,
                Err(e) => {
                    warn!(path = %entry.path().display(), error = %e, "Failed to parse skill, skipping");
                    continue;
                }
            };

            if let Some(existing) = seen.get(&skill.tool_name) {
                warn!(
                    tool = %skill.tool_name,
                    earlier = %existing.display(),
                    later = %skill.path.display(),
                    "Duplicate skill tool name, using the later one"
                );
                skills.retain(|s| s.tool_name != skill.tool_name);
            }

            seen.insert(skill.tool_name.clone(), skill.path.clone());
            skills.push(skill);
        }
    }

    skills
}

/// Parse and validate one `SKILL.md` file.
pub fn parse_skill_file(path: &Path) -> anyhow::Result<Skill> {
    let content = std::fs::read_to_string(path)?;

    let parts: Vec<&str> = content.splitn(3, "---").collect();
    if parts.len() < 3 {
        anyhow::bail!("invalid SKILL.md format: missing frontmatter");
    }

    let frontmatter: SkillFrontmatter = serde_yaml::from_str(parts[1])
        .map_err(|e| anyhow::anyhow!("failed to parse frontmatter: {e}"))?;

    if frontmatter.name.is_empty() {
        anyhow::bail!("skill name is required in frontmatter");
    }
    if !skill_name_regex().is_match(&frontmatter.name) {
        anyhow::bail!(
            "invalid skill name format: {} (must be lowercase alphanumeric with hyphens)",
            frontmatter.name
        );
    }
    if frontmatter.description.len() < MIN_DESCRIPTION_LEN {
        anyhow::bail!(
            "skill description must be at least {MIN_DESCRIPTION_LEN} characters"
        );
    }

    let dir = path
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."));
    let dir_name = dir
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or_default()
        .to_string();

    if frontmatter.name != dir_name {
        anyhow::bail!(
            "skill name '{}' does not match directory name '{}'",
            frontmatter.name,
            dir_name
        );
    }

    let tool_name = generate_tool_name(&skills_relative_path(&dir));

    Ok(Skill {
        name: frontmatter.name,
        tool_name,
        description: frontmatter.description,
        content: parts[2].trim().to_string(),
        license: frontmatter.license,
        allowed_tools: frontmatter.allowed_tools,
        metadata: frontmatter.metadata,
        path: path.to_path_buf(),
        dir,
    })
}

/// The skill directory's path relative to its nearest ancestor named
/// `skills`, or just the directory basename when no such ancestor exists.
fn skills_relative_path(skill_dir: &Path) -> String {
    let mut ancestor = skill_dir.parent();
    while let Some(dir) = ancestor {
        if dir.file_name().and_then(|n| n.to_str()) == Some("skills") {
            if let Ok(rel) = skill_dir.strip_prefix(dir) {
                return rel
                    .components()
                    .map(|c| c.as_os_str().to_string_lossy())
                    .collect::<Vec<_>>()
                    .join("/");
            }
        }
        ancestor = dir.parent();
    }

    skill_dir
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or_default()
        .to_string()
}

/// Convert a skill path into a tool name.
///
/// `tools/analyzer` becomes `skills_tools_analyzer`.
fn generate_tool_name(skill_path: &str) -> String {
    let cleaned = skill_path
        .trim_start_matches("./")
        .trim_end_matches('/');

    let tool_name = cleaned.replace('/', "_");
    let tool_name = sanitize_regex().replace_all(&tool_name, "_");

    format!("{TOOL_NAME_PREFIX}{}", tool_name.to_lowercase())
}

fn skill_name_regex() -> &'static regex::Regex {
    static RE: OnceLock<regex::Regex> = OnceLock::new();
    RE.get_or_init(|| regex::Regex::new(r"^[a-z0-9-]+$").expect("skill name regex"))
}

fn sanitize_regex() -> &'static regex::Regex {
    static RE: OnceLock<regex::Regex> = OnceLock::new();
    RE.get_or_init(|| regex::Regex::new(r"[^a-zA-Z0-9_]").expect("sanitize regex"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_skill(root: &Path, rel_dir: &str, name: &str, description: &str) -> PathBuf {
        let dir = root.join(rel_dir);
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join(SKILL_FILE_NAME);
        std::fs::write(
            &path,
            format!("---\nname: {name}\ndescription: {description}\n---\n\nDo the thing.\n"),
        )
        .unwrap();
        path
    }

    const DESC: &str = "A sufficiently long description for testing";

    #[test]
    fn test_parse_valid_skill() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_skill(dir.path(), "skills/brand-guidelines", "brand-guidelines", DESC);

        let skill = parse_skill_file(&path).unwrap();
        assert_eq!(skill.name, "brand-guidelines");
        assert_eq!(skill.tool_name, "skills_brand_guidelines");
        assert_eq!(skill.content, "Do the thing.");
        assert_eq!(skill.dir, path.parent().unwrap());
    }

    #[test]
    fn test_parse_full_frontmatter() {
        let dir = tempfile::tempdir().unwrap();
        let skill_dir = dir.path().join("skills/review");
        std::fs::create_dir_all(&skill_dir).unwrap();
        let path = skill_dir.join(SKILL_FILE_NAME);
        std::fs::write(
            &path,
            concat!(
                "---\n",
                "name: review\n",
                "description: Reviews code for bugs and style issues\n",
                "license: MIT\n",
                "allowed-tools:\n  - view\n  - grep\n",
                "metadata:\n  team: platform\n",
                "---\n",
                "Review carefully.\n",
            ),
        )
        .unwrap();

        let skill = parse_skill_file(&path).unwrap();
        assert_eq!(skill.license.as_deref(), Some("MIT"));
        assert_eq!(skill.allowed_tools, vec!["view", "grep"]);
        assert_eq!(skill.metadata.get("team").map(String::as_str), Some("platform"));
    }

    #[test]
    fn test_missing_frontmatter_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let skill_dir = dir.path().join("skills/bare");
        std::fs::create_dir_all(&skill_dir).unwrap();
        let path = skill_dir.join(SKILL_FILE_NAME);
        std::fs::write(&path, "just markdown, no frontmatter").unwrap();

        let err = parse_skill_file(&path).unwrap_err().to_string();
        assert!(err.contains("missing frontmatter"));
    }

    #[test]
    fn test_name_directory_mismatch_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_skill(dir.path(), "skills/actual-dir", "other-name", DESC);

        let err = parse_skill_file(&path).unwrap_err().to_string();
        assert!(err.contains("does not match directory name"));
    }

    #[test]
    fn test_short_description_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_skill(dir.path(), "skills/terse", "terse", "too short");

        let err = parse_skill_file(&path).unwrap_err().to_string();
        assert!(err.contains("at least"));
    }

    #[test]
    fn test_invalid_name_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let skill_dir = dir.path().join("skills/Bad_Name");
        std::fs::create_dir_all(&skill_dir).unwrap();
        let path = skill_dir.join(SKILL_FILE_NAME);
        std::fs::write(
            &path,
            format!("---\nname: Bad_Name\ndescription: {DESC}\n---\nbody\n"),
        )
        .unwrap();

        let err = parse_skill_file(&path).unwrap_err().to_string();
        assert!(err.contains("invalid skill name format"));
    }

    #[test]
    fn test_nested_tool_name() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_skill(dir.path(), "skills/tools/analyzer", "analyzer", DESC);

        let skill = parse_skill_file(&path).unwrap();
        assert_eq!(skill.tool_name, "skills_tools_analyzer");
    }

    #[test]
    fn test_tool_name_outside_skills_ancestor_uses_basename() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_skill(dir.path(), "bundles/solo", "solo", DESC);

        let skill = parse_skill_file(&path).unwrap();
        assert_eq!(skill.tool_name, "skills_solo");
    }

    #[test]
    fn test_generated_names_are_well_formed_and_unique() {
        let dir = tempfile::tempdir().unwrap();
        write_skill(dir.path(), "skills/alpha", "alpha", DESC);
        write_skill(dir.path(), "skills/tools/beta-two", "beta-two", DESC);

        let skills = discover_skills(&[dir.path().join("skills")]);
        assert_eq!(skills.len(), 2);

        let shape = regex::Regex::new(r"^skills_[a-z0-9_]+$").unwrap();
        let mut names: Vec<&str> = skills.iter().map(|s| s.tool_name.as_str()).collect();
        for name in &names {
            assert!(shape.is_match(name), "bad tool name: {name}");
        }
        names.sort();
        names.dedup();
        assert_eq!(names.len(), 2);
    }

    #[test]
    fn test_discovery_skips_malformed_skills() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("skills");

        let bar_dir = root.join("bar");
        std::fs::create_dir_all(&bar_dir).unwrap();
        std::fs::write(bar_dir.join(SKILL_FILE_NAME), "no frontmatter at all").unwrap();

        write_skill(dir.path(), "skills/baz", "baz", DESC);

        let skills = discover_skills(&[root]);
        assert_eq!(skills.len(), 1);
        assert_eq!(skills[0].name, "baz");
    }

    #[test]
    fn test_later_root_wins_collision() {
        let user = tempfile::tempdir().unwrap();
        let project = tempfile::tempdir().unwrap();
        write_skill(user.path(), "skills/foo", "foo", "The user-level foo skill text");
        write_skill(project.path(), "skills/foo", "foo", "The project-level foo skill text");

        let skills = discover_skills(&[
            user.path().join("skills"),
            project.path().join("skills"),
        ]);

        assert_eq!(skills.len(), 1);
        assert_eq!(skills[0].tool_name, "skills_foo");
        assert_eq!(skills[0].description, "The project-level foo skill text");
        assert!(skills[0].path.starts_with(project.path()));
    }

    #[test]
    fn test_missing_roots_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let skills = discover_skills(&[
            dir.path().join("does-not-exist"),
            dir.path().join("also-missing"),
        ]);
        assert!(skills.is_empty());
    }

    #[test]
    fn test_frontmatter_round_trip() {
        let original = SkillFrontmatter {
            name: "round-trip".into(),
            description: "A frontmatter block that survives re-serialization".into(),
            license: Some("Apache-2.0".into()),
            allowed_tools: vec!["view".into()],
            metadata: HashMap::from([("key".to_string(), "value".to_string())]),
        };

        let yaml = serde_yaml::to_string(&original).unwrap();
        let reparsed: SkillFrontmatter = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(original, reparsed);
    }

    #[test]
    fn test_base_paths_priority_order() {
        let working = tempfile::tempdir().unwrap();
        let paths = skill_base_paths(working.path());

        // The project-local directory is last, i.e. highest priority.
        assert_eq!(
            paths.last().unwrap(),
            &working.path().join(".quill").join("skills")
        );
    }

    #[tokio::test]
    async fn test_skill_tool_output_format() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_skill(dir.path(), "skills/formatter", "formatter", DESC);
        let skill = parse_skill_file(&path).unwrap();
        let skill_dir = skill.dir.clone();

        let tool = SkillTool::new(skill);
        let response = tool
            .run(ToolCall {
                id: "c1".into(),
                session_id: "s1".into(),
                message_id: "m1".into(),
                input: r#"{"ignored": true}"#.into(),
            })
            .await
            .unwrap();

        assert!(!response.is_error);
        assert!(response.content.starts_with("Launching skill: formatter\n\n"));
        assert!(response
            .content
            .contains(&format!("Base directory for this skill: {}", skill_dir.display())));
        assert!(response.content.ends_with("Do the thing."));
    }
}
