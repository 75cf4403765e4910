use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use globset::Glob;
use tracing::{debug, info};

use super::ConfigError;
use super::types::*;
use crate::consts::{CONFIG_FILENAMES, RUNTIME_DIR_ENV};
use crate::deps::features;
use crate::deps::types::{DependencyKind, DependencySpec, Revision};

/// Resolve the project directory, read its configuration and merge
/// `overrides` over file values over built-in defaults.
///
/// Without a hint, `cwd` and then its parent are searched. With a hint only
/// that directory is consulted, and a missing file falls back to legacy mode
/// where the name comes from `overrides.output` or the directory name.
pub fn resolve_config(
  node_dir_hint: Option<&Path>,
  cwd: &Path,
  overrides: &CliOverrides,
) -> Result<ResolvedConfig, ConfigError> {
  let hint = node_dir_hint.map(|h| absolutize(cwd, h));

  let (project_dir, config_file) = if let Some(explicit) = &overrides.config {
    let file = absolutize(cwd, explicit);
    if !file.is_file() {
      return Err(ConfigError::NotFound { searched: vec![file] });
    }
    let dir = match &hint {
      Some(h) => h.clone(),
      None => file.parent().map(Path::to_path_buf).unwrap_or_else(|| cwd.to_path_buf()),
    };
    (dir, Some(file))
  } else if overrides.no_config {
    (hint.unwrap_or_else(|| cwd.to_path_buf()), None)
  } else if let Some(dir) = hint {
    if !dir.is_dir() {
      return Err(ConfigError::NotFound { searched: vec![dir] });
    }
    let file = find_config_in(&dir)?;
    (dir, file)
  } else {
    let mut searched = Vec::new();
    let mut found = None;
    for dir in std::iter::once(cwd).chain(cwd.parent()) {
      if let Some(file) = find_config_in(dir)? {
        found = Some((dir.to_path_buf(), file));
        break;
      }
      searched.extend(CONFIG_FILENAMES.iter().map(|n| dir.join(n)));
    }
    match found {
      Some((dir, file)) => (dir, Some(file)),
      None => return Err(ConfigError::NotFound { searched }),
    }
  };

  let project_dir = dunce::canonicalize(&project_dir).unwrap_or(project_dir);

  let file = match &config_file {
    Some(path) => load(path)?,
    None => {
      debug!(dir = %project_dir.display(), "no configuration file, using legacy mode");
      legacy_file(&project_dir, overrides)
    }
  };

  let resolved = merge(file, project_dir, config_file, cwd, overrides)?;
  info!(
    name = %resolved.name,
    profile = %resolved.build.profile,
    dir = %resolved.project_dir.display(),
    dependencies = resolved.dependencies.len(),
    "resolved configuration"
  );
  Ok(resolved)
}

/// The configuration file in `dir`, if exactly one accepted spelling exists.
pub fn find_config_in(dir: &Path) -> Result<Option<PathBuf>, ConfigError> {
  let candidates: Vec<PathBuf> = CONFIG_FILENAMES
    .iter()
    .map(|name| dir.join(name))
    .filter(|p| p.is_file())
    .collect();
  match candidates.len() {
    0 => Ok(None),
    1 => Ok(candidates.into_iter().next()),
    _ => Err(ConfigError::Ambiguous {
      dir: dir.to_path_buf(),
      candidates,
    }),
  }
}

fn load(path: &Path) -> Result<ProjectFile, ConfigError> {
  let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
    path: path.to_path_buf(),
    source,
  })?;
  toml::from_str(&content).map_err(|e| ConfigError::Invalid {
    file: path.to_path_buf(),
    field: "document".to_string(),
    message: e.message().to_string(),
  })
}

fn legacy_file(project_dir: &Path, overrides: &CliOverrides) -> ProjectFile {
  let name = overrides.output.clone().or_else(|| {
    project_dir
      .file_name()
      .map(|n| n.to_string_lossy().into_owned())
  });
  ProjectFile {
    node: NodeSection {
      name,
      ..Default::default()
    },
    ..Default::default()
  }
}

struct Validator<'a> {
  file: &'a Path,
}

impl Validator<'_> {
  fn invalid(&self, field: impl Into<String>, message: impl Into<String>) -> ConfigError {
    ConfigError::Invalid {
      file: self.file.to_path_buf(),
      field: field.into(),
      message: message.into(),
    }
  }

  fn parse<T: std::str::FromStr<Err = String>>(
    &self,
    field: &str,
    value: Option<&str>,
  ) -> Result<Option<T>, ConfigError> {
    value
      .map(|v| v.parse::<T>().map_err(|m| self.invalid(field, m)))
      .transpose()
  }

  fn globs(&self, field: &str, patterns: &[String]) -> Result<(), ConfigError> {
    for (i, pattern) in patterns.iter().enumerate() {
      Glob::new(pattern).map_err(|e| self.invalid(format!("{field}[{i}]"), e.to_string()))?;
    }
    Ok(())
  }
}

fn merge(
  file: ProjectFile,
  project_dir: PathBuf,
  config_file: Option<PathBuf>,
  cwd: &Path,
  overrides: &CliOverrides,
) -> Result<ResolvedConfig, ConfigError> {
  let location = config_file.clone().unwrap_or_else(|| project_dir.clone());
  let v = Validator { file: &location };
  let b = file.build;

  let name = file
    .node
    .name
    .filter(|n| !n.trim().is_empty())
    .ok_or_else(|| v.invalid("node.name", "missing required field"))?;

  let profile = match overrides.profile {
    Some(p) => p,
    None => v.parse("build.profile", b.profile.as_deref())?.unwrap_or_default(),
  };
  let toolchain = match overrides.toolchain {
    Some(t) => t,
    None => v.parse("build.toolchain", b.toolchain.as_deref())?.unwrap_or_default(),
  };
  let system = v.parse("build.system", b.system.as_deref())?.unwrap_or_default();
  let warnings = v.parse("build.warnings", b.warnings.as_deref())?.unwrap_or_default();

  let parallel_jobs = match (overrides.parallel_jobs, b.parallel_jobs) {
    (Some(0), _) => return Err(v.invalid("parallel_jobs", "must be at least 1")),
    (Some(n), _) => Some(n),
    (None, Some(n)) if n < 1 => return Err(v.invalid("build.parallel_jobs", "must be at least 1")),
    (None, Some(n)) => Some(n as usize),
    (None, None) => None,
  };

  let build_timeout = positive_secs(&v, "build.build_timeout", b.build_timeout, DEFAULT_BUILD_TIMEOUT_SECS)?;
  let compile_timeout = positive_secs(
    &v,
    "build.compile_timeout",
    b.compile_timeout,
    DEFAULT_COMPILE_TIMEOUT_SECS,
  )?;

  v.globs("build.sources", &b.sources)?;
  v.globs("build.exclude_sources", &b.exclude_sources)?;

  let output = overrides
    .output
    .clone()
    .or(b.output)
    .unwrap_or_else(|| name.clone());

  let build = BuildSettings {
    toolchain,
    system,
    profile,
    std: overrides
      .std
      .clone()
      .or(b.std)
      .unwrap_or_else(|| DEFAULT_CXX_STD.to_string()),
    c_std: b.c_std.unwrap_or_else(|| DEFAULT_C_STD.to_string()),
    optimization: b.optimization,
    debug_info: b.debug_info,
    warnings,
    warnings_as_errors: b.warnings_as_errors,
    cflags: b.cflags,
    cxxflags: b.cxxflags,
    ldflags: b.ldflags,
    defines: b.defines,
    include_dirs: b.include_dirs.iter().map(|d| absolutize(&project_dir, Path::new(d))).collect(),
    lib_dirs: b.lib_dirs.iter().map(|d| absolutize(&project_dir, Path::new(d))).collect(),
    libraries: b.libraries,
    sources: b.sources,
    exclude_sources: b.exclude_sources,
    output,
    parallel_jobs,
    build_timeout,
    compile_timeout,
  };

  let runtime_dir = overrides
    .runtime_dir
    .as_ref()
    .map(|d| absolutize(cwd, d))
    .or_else(|| file.runtime.dir.as_ref().map(|d| absolutize(&project_dir, Path::new(d))))
    .or_else(|| std::env::var_os(RUNTIME_DIR_ENV).filter(|v| !v.is_empty()).map(PathBuf::from));

  let mut dependencies = Vec::with_capacity(file.dependencies.len());
  for (dep_name, section) in file.dependencies {
    dependencies.push(dependency_spec(&v, &project_dir, &dep_name, section)?);
  }

  let out_dir = overrides
    .out_dir
    .as_ref()
    .map(|d| absolutize(cwd, d))
    .unwrap_or_else(|| project_dir.join("target"));

  Ok(ResolvedConfig {
    name,
    version: file.node.version.unwrap_or_else(|| DEFAULT_VERSION.to_string()),
    description: file.node.description,
    build,
    runtime: RuntimeSettings {
      dir: runtime_dir,
      libraries: file.runtime.libraries,
    },
    dependencies,
    out_dir,
    force_rebuild_deps: overrides.force_rebuild_deps,
    project_dir,
    config_file,
  })
}

fn positive_secs(v: &Validator<'_>, field: &str, value: Option<u64>, default: u64) -> Result<Duration, ConfigError> {
  match value {
    Some(0) => Err(v.invalid(field, "must be greater than zero")),
    Some(secs) => Ok(Duration::from_secs(secs)),
    None => Ok(Duration::from_secs(default)),
  }
}

fn dependency_spec(
  v: &Validator<'_>,
  project_dir: &Path,
  name: &str,
  section: DependencySection,
) -> Result<DependencySpec, ConfigError> {
  let field = |key: &str| format!("dependencies.{name}.{key}");

  let revisions: Vec<Revision> = [
    section.rev.clone().map(Revision::Rev),
    section.tag.clone().map(Revision::Tag),
    section.branch.clone().map(Revision::Branch),
  ]
  .into_iter()
  .flatten()
  .collect();
  if revisions.len() > 1 {
    return Err(v.invalid(field("rev"), "at most one of rev, tag and branch may be set"));
  }
  let revision = revisions.into_iter().next();
  let options = cmake_options(v, &field("cmake_options"), &section.cmake_options)?;

  let kind = section.kind.as_deref().unwrap_or("git").trim().to_ascii_lowercase();
  let mut spec = match kind.as_str() {
    "git" => {
      let url = section
        .url
        .clone()
        .filter(|u| !u.trim().is_empty())
        .ok_or_else(|| v.invalid(field("url"), "git dependencies require a url"))?;
      DependencySpec::git(name, url, revision)
    }
    "local" => {
      let path = section
        .path
        .as_deref()
        .ok_or_else(|| v.invalid(field("path"), "local dependencies require a path"))?;
      DependencySpec::local(name, absolutize(project_dir, Path::new(path)))
    }
    "system" => {
      if section.pkg_config.is_none() && section.libraries.is_empty() {
        return Err(v.invalid(field("pkg_config"), "system dependencies require pkg_config or libraries"));
      }
      let mut spec = DependencySpec::new(name, DependencyKind::System);
      spec.pkg_config = section.pkg_config.clone();
      spec
    }
    "feature" => {
      let feature = section.feature.clone().unwrap_or_else(|| name.to_string());
      let mut spec = features::expand(name, &feature).ok_or_else(|| {
        v.invalid(
          field("feature"),
          format!(
            "unknown feature '{feature}', expected one of {}",
            features::KNOWN_FEATURES.join(", ")
          ),
        )
      })?;
      if let Some(url) = section.url.clone() {
        spec.url = Some(url);
      }
      if revision.is_some() {
        spec.revision = revision;
      }
      spec.options.extend(options);
      return Ok(spec);
    }
    "vcpkg" => return Err(v.invalid(field("type"), "vcpkg dependencies are not supported")),
    other => {
      return Err(v.invalid(
        field("type"),
        format!("unknown dependency type '{other}', expected git, local, system or feature"),
      ));
    }
  };

  spec.subdir = section.subdir;
  spec.build_system = section.build_system;
  spec.options = options;
  spec.include_dirs = section.include_dirs;
  spec.lib_dirs = section.lib_dirs;
  spec.libraries = section.libraries;
  Ok(spec)
}

/// Normalise option values to the strings passed as `-D<key>=<value>`.
fn cmake_options(
  v: &Validator<'_>,
  field: &str,
  raw: &BTreeMap<String, toml::Value>,
) -> Result<BTreeMap<String, String>, ConfigError> {
  raw
    .iter()
    .map(|(key, value)| {
      let value = match value {
        toml::Value::String(s) => s.clone(),
        toml::Value::Boolean(true) => "ON".to_string(),
        toml::Value::Boolean(false) => "OFF".to_string(),
        toml::Value::Integer(i) => i.to_string(),
        toml::Value::Float(f) => f.to_string(),
        other => {
          return Err(v.invalid(
            format!("{field}.{key}"),
            format!("unsupported value type '{}'", other.type_str()),
          ));
        }
      };
      Ok((key.clone(), value))
    })
    .collect()
}

fn absolutize(base: &Path, path: &Path) -> PathBuf {
  if path.is_absolute() {
    path.to_path_buf()
  } else {
    base.join(path)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::toolchain::{ToolchainPreference, WarningLevel};
  use serial_test::serial;
  use std::fs;
  use tempfile::TempDir;

  fn write_config(dir: &Path, content: &str) {
    fs::write(dir.join("cxxnode.toml"), content).unwrap();
  }

  fn resolve_in(dir: &Path) -> Result<ResolvedConfig, ConfigError> {
    resolve_config(None, dir, &CliOverrides::default())
  }

  #[test]
  fn minimal_file_gets_defaults() {
    let temp = TempDir::new().unwrap();
    write_config(temp.path(), "[node]\nname = \"camera\"\n");

    let config = resolve_in(temp.path()).unwrap();

    assert_eq!(config.name, "camera");
    assert_eq!(config.version, "0.1.0");
    assert_eq!(config.build.profile, Profile::Debug);
    assert_eq!(config.build.toolchain, ToolchainPreference::Auto);
    assert_eq!(config.build.std, "c++17");
    assert_eq!(config.build.c_std, "c11");
    assert_eq!(config.build.warnings, WarningLevel::Default);
    assert_eq!(config.build.output, "camera");
    assert_eq!(config.build.build_timeout, Duration::from_secs(300));
    assert_eq!(config.out_dir, config.project_dir.join("target"));
    assert!(config.dependencies.is_empty());
  }

  #[test]
  fn overrides_beat_file_values() {
    let temp = TempDir::new().unwrap();
    write_config(
      temp.path(),
      r#"
[node]
name = "camera"

[build]
profile = "debug"
toolchain = "gcc"
std = "c++14"
output = "cam"
"#,
    );
    let overrides = CliOverrides {
      profile: Some(Profile::Release),
      toolchain: Some(ToolchainPreference::Clang),
      std: Some("c++20".into()),
      ..Default::default()
    };

    let config = resolve_config(None, temp.path(), &overrides).unwrap();

    assert_eq!(config.build.profile, Profile::Release);
    assert_eq!(config.build.toolchain, ToolchainPreference::Clang);
    assert_eq!(config.build.std, "c++20");
    assert_eq!(config.build.output, "cam");
  }

  #[test]
  fn parent_directory_is_searched() {
    let temp = TempDir::new().unwrap();
    write_config(temp.path(), "[node]\nname = \"outer\"\n");
    let nested = temp.path().join("src");
    fs::create_dir(&nested).unwrap();

    let config = resolve_in(&nested).unwrap();
    assert_eq!(config.name, "outer");
    assert_eq!(config.project_dir, dunce::canonicalize(temp.path()).unwrap());
  }

  #[test]
  fn missing_file_without_hint_is_not_found() {
    let temp = TempDir::new().unwrap();
    let nested = temp.path().join("a");
    fs::create_dir(&nested).unwrap();
    let err = resolve_in(&nested).unwrap_err();
    assert!(matches!(err, ConfigError::NotFound { .. }));
  }

  #[test]
  fn hinted_directory_without_file_is_legacy_mode() {
    let temp = TempDir::new().unwrap();
    let node_dir = temp.path().join("simple-node");
    fs::create_dir(&node_dir).unwrap();

    let overrides = CliOverrides {
      profile: Some(Profile::Release),
      ..Default::default()
    };
    let config = resolve_config(Some(Path::new("simple-node")), temp.path(), &overrides).unwrap();

    assert_eq!(config.name, "simple-node");
    assert!(config.config_file.is_none());
    assert_eq!(config.build.profile, Profile::Release);
  }

  #[test]
  fn legacy_name_comes_from_output_override() {
    let temp = TempDir::new().unwrap();
    let overrides = CliOverrides {
      no_config: true,
      output: Some("my-node".into()),
      ..Default::default()
    };
    let config = resolve_config(None, temp.path(), &overrides).unwrap();
    assert_eq!(config.name, "my-node");
    assert_eq!(config.build.output, "my-node");
  }

  #[test]
  fn both_spellings_are_ambiguous() {
    let temp = TempDir::new().unwrap();
    write_config(temp.path(), "[node]\nname = \"a\"\n");
    fs::write(temp.path().join(".cxxnode.toml"), "[node]\nname = \"b\"\n").unwrap();

    let err = resolve_in(temp.path()).unwrap_err();
    assert!(matches!(err, ConfigError::Ambiguous { .. }));
  }

  #[test]
  fn hidden_spelling_is_accepted() {
    let temp = TempDir::new().unwrap();
    fs::write(temp.path().join(".cxxnode.toml"), "[node]\nname = \"hidden\"\n").unwrap();
    assert_eq!(resolve_in(temp.path()).unwrap().name, "hidden");
  }

  #[test]
  fn explicit_config_path_must_exist() {
    let temp = TempDir::new().unwrap();
    let overrides = CliOverrides {
      config: Some(PathBuf::from("nope.toml")),
      ..Default::default()
    };
    let err = resolve_config(None, temp.path(), &overrides).unwrap_err();
    assert!(matches!(err, ConfigError::NotFound { .. }));
  }

  fn invalid_field(content: &str) -> String {
    let temp = TempDir::new().unwrap();
    write_config(temp.path(), content);
    match resolve_in(temp.path()).unwrap_err() {
      ConfigError::Invalid { field, .. } => field,
      other => panic!("expected Invalid, got {other:?}"),
    }
  }

  #[test]
  fn semantic_errors_name_the_field() {
    assert_eq!(invalid_field("[build]\nprofile = \"debug\"\n"), "node.name");
    assert_eq!(
      invalid_field("[node]\nname = \"x\"\n[build]\nprofile = \"fast\"\n"),
      "build.profile"
    );
    assert_eq!(
      invalid_field("[node]\nname = \"x\"\n[build]\ntoolchain = \"icc\"\n"),
      "build.toolchain"
    );
    assert_eq!(
      invalid_field("[node]\nname = \"x\"\n[build]\nparallel_jobs = 0\n"),
      "build.parallel_jobs"
    );
    assert_eq!(
      invalid_field("[node]\nname = \"x\"\n[build]\nsources = [\"src/[*.cc\"]\n"),
      "build.sources[0]"
    );
  }

  #[test]
  fn syntax_errors_are_invalid() {
    assert_eq!(invalid_field("[node\nname = 1"), "document");
  }

  #[test]
  fn dependency_validation() {
    assert_eq!(
      invalid_field("[node]\nname = \"x\"\n[dependencies.foo]\ntype = \"git\"\n"),
      "dependencies.foo.url"
    );
    assert_eq!(
      invalid_field("[node]\nname = \"x\"\n[dependencies.foo]\nurl = \"u\"\ntag = \"a\"\nbranch = \"b\"\n"),
      "dependencies.foo.rev"
    );
    assert_eq!(
      invalid_field("[node]\nname = \"x\"\n[dependencies.foo]\ntype = \"local\"\n"),
      "dependencies.foo.path"
    );
    assert_eq!(
      invalid_field("[node]\nname = \"x\"\n[dependencies.foo]\ntype = \"system\"\n"),
      "dependencies.foo.pkg_config"
    );
    assert_eq!(
      invalid_field("[node]\nname = \"x\"\n[dependencies.opencv]\ntype = \"feature\"\n"),
      "dependencies.opencv.feature"
    );
  }

  #[test]
  fn git_dependency_is_parsed() {
    let temp = TempDir::new().unwrap();
    write_config(
      temp.path(),
      r#"
[node]
name = "x"

[dependencies.fmt]
url = "https://github.com/fmtlib/fmt.git"
tag = "10.2.1"
build_system = "cmake"
libraries = ["fmt"]

[dependencies.fmt.cmake_options]
FMT_TEST = false
FMT_DOC = "OFF"
JOBS = 4
"#,
    );

    let config = resolve_in(temp.path()).unwrap();
    let dep = &config.dependencies[0];

    assert_eq!(dep.kind, DependencyKind::Git);
    assert_eq!(dep.revision, Some(Revision::Tag("10.2.1".into())));
    assert_eq!(dep.build_system.as_deref(), Some("cmake"));
    assert_eq!(dep.options.get("FMT_TEST").map(String::as_str), Some("OFF"));
    assert_eq!(dep.options.get("JOBS").map(String::as_str), Some("4"));
  }

  #[test]
  fn feature_dependency_expands_with_overrides() {
    let temp = TempDir::new().unwrap();
    write_config(
      temp.path(),
      r#"
[node]
name = "x"

[dependencies.eigen3]
type = "feature"
tag = "3.4.1"
"#,
    );

    let config = resolve_in(temp.path()).unwrap();
    let dep = &config.dependencies[0];

    assert_eq!(dep.feature.as_deref(), Some("eigen3"));
    assert_eq!(dep.url.as_deref(), Some(features::EIGEN_URL));
    assert_eq!(dep.revision, Some(Revision::Tag("3.4.1".into())));
  }

  #[test]
  fn relative_dirs_become_absolute() {
    let temp = TempDir::new().unwrap();
    write_config(
      temp.path(),
      "[node]\nname = \"x\"\n[build]\ninclude_dirs = [\"third_party/inc\"]\n[dependencies.lib]\ntype = \"local\"\npath = \"../lib\"\n",
    );
    let config = resolve_in(temp.path()).unwrap();
    assert_eq!(config.build.include_dirs, vec![config.project_dir.join("third_party/inc")]);
    assert_eq!(config.dependencies[0].path, Some(config.project_dir.join("../lib")));
  }

  #[test]
  #[serial]
  fn runtime_dir_falls_back_to_env() {
    let temp = TempDir::new().unwrap();
    write_config(temp.path(), "[node]\nname = \"x\"\n");
    temp_env::with_var(RUNTIME_DIR_ENV, Some("/opt/runtime/target"), || {
      let config = resolve_in(temp.path()).unwrap();
      assert_eq!(config.runtime.dir, Some(PathBuf::from("/opt/runtime/target")));
    });
  }
}
