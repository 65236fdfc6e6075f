use acqopt::prelude::*;
use acqopt::routines::settings::read;
use eyre::Result;
use std::path::PathBuf;

/// Write a TOML fixture to a fresh folder in the temp dir
fn fixture(name: &str, contents: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("acqopt-settings-{}-{}", name, std::process::id()));
    std::fs::create_dir_all(&dir).unwrap();
    let path = dir.join("settings.toml");
    std::fs::write(&path, contents).unwrap();
    path
}

const HAHN_ECHO: &str = r#"
[config]
algorithm = "MDS"
maxfev = 40
maxiter = 25
simplex = "axis"

[[parameters]]
name = "Attenuation"
init = 12.0
lower = 0.0
upper = 60.0
tol = 0.5

[[parameters]]
name = "p1"
init = 16.0
lower = 8.0
upper = 40.0
tol = 2.0

[files]
experiment = "hahn.exp"
definition = "hahn.def"

[log]
write = false

[output]
write = false
"#;

#[test]
fn read_settings_from_toml() -> Result<()> {
    let path = fixture("read", HAHN_ECHO);
    let settings = read(path.to_string_lossy())?;

    assert_eq!(settings.config().algorithm, Algorithm::MultidirectionalSearch);
    assert_eq!(settings.config().maxfev, 40);
    assert_eq!(settings.config().maxiter, 25);
    assert_eq!(settings.config().nfactor, 10.0);
    assert_eq!(settings.config().simplex, SimplexMethod::Axis);
    assert_eq!(settings.parameters().names(), vec!["Attenuation", "p1"]);
    assert_eq!(settings.parameters().tol(), ndarray::array![0.5, 2.0]);
    assert_eq!(settings.files().definition, Some(PathBuf::from("hahn.def")));
    assert!(!settings.log().write);
    assert!(!settings.output().write);

    std::fs::remove_dir_all(path.parent().unwrap()).ok();
    Ok(())
}

#[test]
fn unknown_fields_are_rejected() {
    let path = fixture(
        "unknown",
        r#"
[config]
algoritm = "nm"

[[parameters]]
name = "p1"
init = 16.0
lower = 8.0
upper = 40.0
tol = 2.0
"#,
    );
    assert!(read(path.to_string_lossy()).is_err());
    std::fs::remove_dir_all(path.parent().unwrap()).ok();
}

#[test]
fn invalid_values_are_rejected_when_read() {
    let unknown_algorithm = HAHN_ECHO.replace("\"MDS\"", "\"simplex\"");
    let path = fixture("algorithm", &unknown_algorithm);
    assert!(read(path.to_string_lossy()).is_err());
    std::fs::remove_dir_all(path.parent().unwrap()).ok();

    let out_of_bounds = HAHN_ECHO.replace("init = 16.0", "init = 48.0");
    let path = fixture("bounds", &out_of_bounds);
    let err = read(path.to_string_lossy()).unwrap_err();
    assert!(err.to_string().contains("out of bounds"));
    std::fs::remove_dir_all(path.parent().unwrap()).ok();
}

#[test]
fn settings_copy_is_written_to_output_folder() -> Result<()> {
    let path = fixture("copy", "");
    let folder = path.parent().unwrap().join("run#");
    let contents = format!(
        "{}\n[output]\nwrite = true\npath = {:?}\n",
        HAHN_ECHO.replace("[output]\nwrite = false\n", ""),
        folder.to_string_lossy()
    );
    std::fs::write(&path, contents)?;

    let settings = read(path.to_string_lossy())?;
    assert!(settings.output().path.ends_with("run1"));
    let copy_path = PathBuf::from(&settings.output().path).join("settings.json");
    let copy = std::fs::read_to_string(copy_path)?;
    assert!(copy.contains("\"algorithm\": \"mds\""));

    std::fs::remove_dir_all(path.parent().unwrap()).ok();
    Ok(())
}

#[test]
fn settings_builder() -> Result<()> {
    let params = Parameters::new()
        .add("VideoGain", 18.0, 0.0, 48.0, 6.0)?
        .add("d1", 400.0, 200.0, 800.0, 10.0)?;

    let settings = Settings::builder()
        .set_algorithm(Algorithm::BruteForce)
        .set_parameters(params)
        .set_files("hahn.exp", "hahn.def")
        .build();

    assert_eq!(settings.config().algorithm, Algorithm::BruteForce);
    assert_eq!(settings.parameters().len(), 2);
    assert_eq!(settings.config().maxfev, 0);
    assert!(settings.validate().is_ok());
    Ok(())
}

#[test]
fn settings_serialization() -> Result<()> {
    let params = Parameters::new()
        .add("p1", 16.0, 8.0, 40.0, 2.0)?
        .push(
            Parameter::new("CenterField", 3350.0, 3300.0, 3400.0, 0.5)?
                .with_target(ParameterTarget::Definition),
        )?;
    let settings = Settings::builder()
        .set_algorithm(Algorithm::NelderMead)
        .set_parameters(params)
        .build();

    let json = serde_json::to_string(&settings)?;
    assert!(json.contains("\"algorithm\":\"nm\""));
    assert!(json.contains("\"target\":\"definition\""));

    let deserialized: Settings = serde_json::from_str(&json)?;
    assert_eq!(deserialized.parameters(), settings.parameters());
    // an explicit target overrides classification by name
    assert_eq!(
        deserialized.parameters().targets(),
        vec![ParameterTarget::Definition, ParameterTarget::Definition]
    );
    Ok(())
}
