use predicates::prelude::*;

use super::common::TestEnv;

const NODE_SOURCE: &str = "int main() { return 0; }\n";

fn simple_node(env: &TestEnv) {
  env.write_file("simple-node/src/node.cc", NODE_SOURCE);
}

#[test]
fn legacy_release_build_produces_executable() {
  let env = TestEnv::new();
  simple_node(&env);

  env
    .cmd(&env.root())
    .args(["build", "--node-dir", "simple-node", "--profile", "release"])
    .assert()
    .success()
    .stdout(predicate::str::contains("Built simple-node"));

  assert!(env.path("simple-node/target/release/simple-node").is_file());
  assert!(!env.cache_path().exists());
}

#[test]
fn config_file_is_found_from_project_dir() {
  let env = TestEnv::new();
  simple_node(&env);
  env.write_file(
    "simple-node/cxxnode.toml",
    "[node]\nname = \"talker\"\n\n[build]\nstd = \"c++20\"\ndefines = [\"TALKER=1\"]\n",
  );

  env
    .cmd(&env.path("simple-node"))
    .arg("build")
    .assert()
    .success()
    .stdout(predicate::str::contains("Built talker"));

  assert!(env.path("simple-node/target/debug/talker").is_file());
  let compile = env
    .compiler_invocations()
    .into_iter()
    .find(|l| l.contains(" -c "))
    .unwrap();
  assert!(compile.contains("-std=c++20"));
  assert!(compile.contains("-DTALKER=1"));
}

#[test]
fn second_build_is_up_to_date() {
  let env = TestEnv::new();
  simple_node(&env);
  let build = |env: &TestEnv| env.cmd(&env.root()).args(["build", "--node-dir", "simple-node"]).assert().success();

  build(&env);
  build(&env).stdout(predicate::str::contains("is up to date"));
}

#[test]
fn json_output_reports_the_build() {
  let env = TestEnv::new();
  simple_node(&env);

  let output = env
    .cmd(&env.root())
    .args(["build", "--node-dir", "simple-node", "-o", "json"])
    .output()
    .unwrap();

  assert!(output.status.success());
  let value: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
  assert_eq!(value["report"]["compiled"], 1);
  assert_eq!(value["report"]["linked"], true);
  assert_eq!(value["toolchain"]["family"], "clang");
}

#[test]
fn compile_error_fails_with_diagnostics() {
  let env = TestEnv::new();
  simple_node(&env);
  env.write_file("simple-node/src/bad.cc", "int broken\n");

  env
    .cmd(&env.root())
    .args(["build", "--node-dir", "simple-node"])
    .assert()
    .failure()
    .code(1)
    .stderr(predicate::str::contains("bad.cc"))
    .stderr(predicate::str::contains("error: expected ';'"));

  assert!(!env.path("simple-node/target/debug/simple-node").exists());
}

#[test]
fn empty_project_reports_no_sources() {
  let env = TestEnv::new();
  env.write_file("empty-node/README.md", "nothing here\n");

  env
    .cmd(&env.root())
    .args(["build", "--node-dir", "empty-node"])
    .assert()
    .failure()
    .stderr(predicate::str::contains("no source files"));
}

#[test]
fn unavailable_toolchain_is_not_substituted() {
  let env = TestEnv::new();
  simple_node(&env);

  env
    .cmd(&env.root())
    .args(["build", "--node-dir", "simple-node", "--toolchain", "msvc"])
    .assert()
    .failure()
    .stderr(predicate::str::contains("toolchain 'msvc' is not available"));

  assert!(env.compiler_invocations().is_empty());
}

#[test]
fn invalid_config_names_the_field() {
  let env = TestEnv::new();
  simple_node(&env);
  env.write_file(
    "simple-node/cxxnode.toml",
    "[node]\nname = \"talker\"\n\n[build]\nprofile = \"fast\"\n",
  );

  env
    .cmd(&env.path("simple-node"))
    .arg("build")
    .assert()
    .failure()
    .stderr(predicate::str::contains("build.profile"));
}

#[test]
fn local_dependency_is_cached_once() {
  let env = TestEnv::new();
  simple_node(&env);
  env.write_file("mathlib/include/mathlib/add.hpp", "int add(int, int);\n");
  env.write_file(
    "simple-node/cxxnode.toml",
    "[node]\nname = \"adder\"\n\n[dependencies.mathlib]\ntype = \"local\"\npath = \"../mathlib\"\nbuild_system = \"none\"\n",
  );
  let build = |env: &TestEnv| {
    env
      .cmd(&env.path("simple-node"))
      .args(["build", "-o", "json"])
      .output()
      .unwrap()
  };

  let first: serde_json::Value = serde_json::from_slice(&build(&env).stdout).unwrap();
  let second: serde_json::Value = serde_json::from_slice(&build(&env).stdout).unwrap();

  assert_eq!(first["dependencies"][0]["cache_hit"], false);
  assert_eq!(second["dependencies"][0]["cache_hit"], true);
  assert_eq!(
    first["dependencies"][0]["artifacts"]["label"],
    second["dependencies"][0]["artifacts"]["label"]
  );
  let include = first["dependencies"][0]["artifacts"]["include_dirs"][0].as_str().unwrap();
  assert!(std::path::Path::new(include).join("mathlib/add.hpp").is_file());
}
