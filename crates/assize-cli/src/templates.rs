pub const GITIGNORE: &str = "/.assize/\n*.db\n*.db-shm\n*.db-wal\n";

pub const SAMPLE_DATASET_NAME: &str = "jokes";

pub const SAMPLE_DATASET: &str = r#"{"prompt": "Tell me a joke about compilers."}
{"prompt": "Tell me a joke about the borrow checker."}
{"prompt": "Tell me a joke about databases."}
"#;
