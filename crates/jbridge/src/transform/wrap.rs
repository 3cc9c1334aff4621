//! Mode-specific wrappers around rendered code.
//!
//! Payloads are embedded as double-quoted string literals produced by JSON
//! string escaping. JSON escapes (`\"`, `\\`, `\n`, `\uXXXX`, ...) are a subset
//! of Python string escapes, so the literal evaluates to the exact payload.

/// Kernel-side helper that runs SQL text. Defined by the bootstrap preamble.
pub const SQL_HELPER: &str = "execute_sql_query";

/// System-mode file that is installed as packages.
pub const REQUIREMENTS_FILE: &str = "requirements.txt";

/// System-mode file that is loaded into the kernel environment.
pub const ENV_FILE: &str = ".env";

const REQUIREMENTS_SCRIPT: &str = r##"
def _jbridge_install_requirements(text):
    import os
    import shutil
    import site
    import subprocess
    import sys

    dirs = []
    try:
        dirs.extend(site.getsitepackages())
    except Exception:
        pass
    try:
        dirs.append(site.getusersitepackages())
    except Exception:
        pass
    for d in dirs:
        if not os.path.isdir(d):
            continue
        for item in os.listdir(d):
            if not item.startswith("~"):
                continue
            path = os.path.join(d, item)
            try:
                if os.path.isdir(path):
                    shutil.rmtree(path)
                else:
                    os.remove(path)
            except Exception:
                pass

    packages = [line.strip() for line in text.split("\n") if line.strip() and not line.strip().startswith("#")]
    if not packages:
        print("No packages to install.")
        return
    print(f"Installing packages: {packages}")
    try:
        result = subprocess.run(
            [sys.executable, "-m", "pip", "install", *packages],
            capture_output=True,
            text=True,
        )
        if result.stdout:
            print(result.stdout)
        if result.returncode == 0:
            print("\n[SUCCESS] All packages installed.")
        else:
            print(result.stderr)
            print(f"\n[ERROR] pip exited with status {result.returncode}.")
    except Exception as e:
        print(f"\n[ERROR] Installation failed: {e}")

_jbridge_install_requirements(_jbridge_payload)
del _jbridge_payload, _jbridge_install_requirements
"##;

const DOTENV_SCRIPT: &str = r##"
def _jbridge_load_env(text):
    import os

    updated = []
    for line in text.split("\n"):
        line = line.strip()
        if not line or line.startswith("#") or "=" not in line:
            continue
        key, value = line.split("=", 1)
        key, value = key.strip(), value.strip()
        if len(value) >= 2 and value[0] == value[-1] and value[0] in "\"'":
            value = value[1:-1]
        os.environ[key] = value
        updated.append(key)
    if updated:
        print(f"Environment variables updated ({len(updated)})")
    else:
        print("No variables found.")

_jbridge_load_env(_jbridge_payload)
del _jbridge_payload, _jbridge_load_env
"##;

/// Quote `text` as a kernel-language string literal.
pub fn string_literal(text: &str) -> String {
    serde_json::Value::String(text.to_string()).to_string()
}

pub(super) fn sql(query: &str) -> String {
    format!("{SQL_HELPER}({})", string_literal(query))
}

pub(super) fn requirements(text: &str) -> String {
    with_payload(text, REQUIREMENTS_SCRIPT)
}

pub(super) fn dotenv(text: &str) -> String {
    with_payload(text, DOTENV_SCRIPT)
}

fn with_payload(text: &str, script: &str) -> String {
    format!("_jbridge_payload = {}\n{}", string_literal(text), script)
}
