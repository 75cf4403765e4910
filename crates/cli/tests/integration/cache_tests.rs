use predicates::prelude::*;

use super::common::TestEnv;

/// Two projects, each with its own header-only local dependency.
fn populated(env: &TestEnv) {
  for (node, dep) in [("node-a", "mathlib"), ("node-b", "geomlib")] {
    env.write_file(&format!("{node}/src/main.cc"), "int main() {}\n");
    env.write_file(&format!("{dep}/include/{dep}.hpp"), "#pragma once\n");
    env.write_file(
      &format!("{node}/cxxnode.toml"),
      &format!(
        "[node]\nname = \"{node}\"\n\n[dependencies.{dep}]\ntype = \"local\"\npath = \"../{dep}\"\nbuild_system = \"none\"\n"
      ),
    );
    env.cmd(&env.path(node)).arg("build").assert().success();
  }
}

#[test]
fn info_on_empty_cache() {
  let env = TestEnv::new();

  env
    .cmd(&env.root())
    .args(["cache", "info"])
    .assert()
    .success()
    .stdout(predicate::str::contains("No cached dependencies"));
}

#[test]
fn info_lists_entries() {
  let env = TestEnv::new();
  populated(&env);

  let output = env.cmd(&env.root()).args(["cache", "info", "-o", "json"]).output().unwrap();

  assert!(output.status.success());
  let report: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
  let names: Vec<&str> = report["entries"]
    .as_array()
    .unwrap()
    .iter()
    .map(|e| e["name"].as_str().unwrap())
    .collect();
  assert_eq!(names.len(), 2);
  assert!(names.contains(&"mathlib"));
  assert!(names.contains(&"geomlib"));
}

#[test]
fn clean_by_name_keeps_other_entries() {
  let env = TestEnv::new();
  populated(&env);

  env
    .cmd(&env.root())
    .args(["cache", "clean", "mathlib"])
    .assert()
    .success()
    .stdout(predicate::str::contains("Cache cleaned"))
    .stdout(predicate::str::contains("mathlib-"));

  env
    .cmd(&env.root())
    .args(["cache", "info"])
    .assert()
    .success()
    .stdout(predicate::str::contains("geomlib-"))
    .stdout(predicate::str::contains("mathlib-").not());
}

#[test]
fn clean_all_empties_cache() {
  let env = TestEnv::new();
  populated(&env);

  let output = env.cmd(&env.root()).args(["cache", "clean", "-o", "json"]).output().unwrap();

  assert!(output.status.success());
  let report: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
  assert_eq!(report["removed"].as_array().unwrap().len(), 2);
  assert!(report["bytes_freed"].as_u64().unwrap() > 0);

  env
    .cmd(&env.root())
    .args(["cache", "info"])
    .assert()
    .success()
    .stdout(predicate::str::contains("No cached dependencies"));
}

#[test]
fn clean_unknown_name_removes_nothing() {
  let env = TestEnv::new();
  populated(&env);

  env
    .cmd(&env.root())
    .args(["cache", "clean", "arrow"])
    .assert()
    .success()
    .stdout(predicate::str::contains("Nothing to remove"));
}
