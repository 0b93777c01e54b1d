use stackmate::models::*;
use stackmate::reconcile::*;
use speculate2::speculate;

fn wired_stage() -> Stage {
    let mut project = Project::new("shop").expect("Failed to create project");
    project.add_stage("dev", "local").expect("Failed to add stage");
    project.stages.remove(0)
}

fn functions(list: &[(&str, &str)]) -> LocalResources {
    LocalResources {
        functions: list.iter().map(|(n, h)| Resource::new(*n, *h)).collect(),
        public: Vec::new(),
    }
}

speculate! {
    before {
        let mut stage = wired_stage();
        let env = EnvironmentConfig::default();
    }

    describe "first deploy" {
        it "adds every local function" {
            let diff = apply_changes(&mut stage, &functions(&[("ping", "h1"), ("pong", "h2")]), &env)
                .expect("Failed to apply changes");

            assert_eq!(diff.functions.added, vec!["ping", "pong"]);
            assert!(diff.functions.removed.is_empty());
            assert!(diff.infrastructure_changed());
            assert_eq!(diff.updated_functions(), ["ping".to_string(), "pong".to_string()]);
        }

        it "records hashes and storage keys" {
            apply_changes(&mut stage, &functions(&[("ping", "h1")]), &env)
                .expect("Failed to apply changes");

            let ping = stage.function("ping").expect("missing function");
            assert_eq!(ping.hash(), "h1");
            assert_eq!(ping.s3_key(), "functions/shop/dev/ping-h1.zip");
        }

        it "reports nothing for an empty stage and no local resources" {
            let diff = apply_changes(&mut stage, &LocalResources::default(), &env)
                .expect("Failed to apply changes");

            assert!(!diff.has_updates());
            assert!(!diff.infrastructure_changed());
        }
    }

    describe "subsequent deploys" {
        before {
            apply_changes(&mut stage, &functions(&[("ping", "h1")]), &env)
                .expect("Failed to apply changes");
        }

        it "is idempotent for unchanged resources" {
            let diff = apply_changes(&mut stage, &functions(&[("ping", "h1")]), &env)
                .expect("Failed to apply changes");

            assert!(!diff.has_updates());
            assert_eq!(diff.functions.unchanged, vec!["ping"]);
        }

        it "treats a new hash as a content-only update" {
            let diff = apply_changes(&mut stage, &functions(&[("ping", "h2")]), &env)
                .expect("Failed to apply changes");

            assert_eq!(diff.updated_functions(), ["ping".to_string()]);
            assert!(diff.has_function_updates());
            assert!(!diff.infrastructure_changed());
            assert_eq!(
                stage.function("ping").expect("missing").s3_key(),
                "functions/shop/dev/ping-h2.zip"
            );
        }

        it "removes functions that disappeared locally" {
            let diff = apply_changes(&mut stage, &functions(&[("pong", "h3")]), &env)
                .expect("Failed to apply changes");

            assert_eq!(diff.functions.added, vec!["pong"]);
            assert_eq!(diff.functions.removed, vec!["ping"]);
            assert!(diff.infrastructure_changed());
            assert!(stage.function("ping").is_none());
        }

        it "keeps the counts consistent with the local list" {
            let local = functions(&[("ping", "h9"), ("pong", "h1"), ("zap", "h1")]);
            apply_changes(&mut stage, &functions(&[("ping", "h1"), ("pong", "h1")]), &env)
                .expect("Failed to apply changes");
            let diff = apply_changes(&mut stage, &local, &env).expect("Failed to apply changes");

            let f = &diff.functions;
            assert!(f.added.iter().all(|name| !f.removed.contains(name)));
            let hash_only = f.updated.iter().filter(|n| !f.added.contains(n)).count();
            assert_eq!(f.added.len() + f.unchanged.len() + hash_only, local.functions.len());
        }
    }

    describe "invalid names" {
        it "fails without touching the stage" {
            let err = apply_changes(
                &mut stage,
                &functions(&[("good", "h1"), ("bad name", "h2")]),
                &env,
            )
            .unwrap_err();

            assert!(matches!(err, ReconcileError::Model(ModelError::InvalidName { .. })));
            assert!(stage.functions.is_empty());
        }

        it "rejects reserved function names" {
            let err = apply_changes(&mut stage, &functions(&[("public", "h1")]), &env).unwrap_err();
            assert_eq!(err, ReconcileError::Model(ModelError::ReservedName("public".to_string())));
        }

        it "validates site names before adding functions" {
            let local = LocalResources {
                functions: vec![Resource::new("ping", "h1")],
                public: vec![Resource::new("bad/site", "p1")],
            };
            assert!(apply_changes(&mut stage, &local, &env).is_err());
            assert!(stage.functions.is_empty());
        }
    }

    describe "public sites" {
        it "tracks sites separately from functions" {
            let local = LocalResources {
                functions: Vec::new(),
                public: vec![Resource::new("www", "p1")],
            };
            let diff = apply_changes(&mut stage, &local, &env).expect("Failed to apply changes");

            assert!(diff.has_public_updates());
            assert!(!diff.has_function_updates());
            assert_eq!(diff.updated_public_sites(), ["www".to_string()]);
            assert_eq!(stage.site("www").expect("missing site").hash, "p1");

            let local = LocalResources {
                functions: Vec::new(),
                public: vec![Resource::new("www", "p2")],
            };
            let diff = apply_changes(&mut stage, &local, &env).expect("Failed to apply changes");
            assert!(diff.has_public_updates());
            assert!(!diff.infrastructure_changed());
        }
    }

    describe "configuration" {
        it "applies layered overrides and reports the change once" {
            apply_changes(&mut stage, &functions(&[("report", "h1")]), &env)
                .expect("Failed to apply changes");

            let yaml = r#"
project:
  memory_size: 512
  stages:
    - name: dev
      functions:
        - name: report
          timeout: 300
"#;
            let env: EnvironmentConfig = serde_yaml::from_str(yaml).expect("Failed to parse");
            let diff = apply_changes(&mut stage, &functions(&[("report", "h1")]), &env)
                .expect("Failed to apply changes");

            assert!(diff.config_changed);
            assert!(diff.has_updates());
            assert!(diff.infrastructure_changed());
            let config = &stage.function("report").expect("missing").configuration;
            assert_eq!(config.memory_size, 512);
            assert_eq!(config.timeout, 300);

            let diff = apply_changes(&mut stage, &functions(&[("report", "h1")]), &env)
                .expect("Failed to apply changes");
            assert!(!diff.has_updates());
        }
    }
}
