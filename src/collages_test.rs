#[cfg(test)]
mod tests {
    use crate::cache::{connect, maybe_invalidate_cache_database};
    use crate::collages::{add_release_to_collage, create_collage, delete_collage, remove_release_from_collage, rename_collage};
    use crate::config::Config;
    use crate::test_utils::test_utils::create_test_config;
    use rusqlite::params;
    use std::fs;
    use tempfile::TempDir;

    fn setup_test() -> (Config, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let config = create_test_config(&temp_dir);
        fs::create_dir_all(&config.music_source_dir).unwrap();
        fs::create_dir_all(&config.cache_dir).unwrap();
        fs::create_dir_all(config.music_source_dir.join("!collages")).unwrap();
        maybe_invalidate_cache_database(&config).unwrap();
        (config, temp_dir)
    }

    fn insert_release(config: &Config, id: &str, title: &str) {
        let conn = connect(config).unwrap();
        conn.execute(
            "INSERT INTO releases (id, source_path, added_at, datafile_mtime, title, releasetype, disctotal, new, metahash)
             VALUES (?1, ?2, '0000-01-01T00:00:00+00:00', '999', ?3, 'album', 1, false, 'h')",
            params![id, config.music_source_dir.join(id).to_string_lossy().to_string(), title],
        )
        .unwrap();
        conn.execute(
            "INSERT INTO releases_artists (release_id, artist, role, position) VALUES (?1, 'Techno Man', 'main', 1)",
            params![id],
        )
        .unwrap();
    }

    fn write_collage(config: &Config, name: &str, contents: &str) {
        fs::write(config.music_source_dir.join("!collages").join(format!("{name}.toml")), contents).unwrap();
    }

    #[test]
    fn test_collage_lifecycle() {
        let (config, _temp) = setup_test();
        insert_release(&config, "ilovecarly", "Carly Release");
        insert_release(&config, "ilovenewjeans", "NewJeans Release");

        let filepath = config.music_source_dir.join("!collages").join("All Eyes.toml");
        assert!(!filepath.exists());
        create_collage(&config, "All Eyes").unwrap();
        assert!(filepath.is_file());
        {
            let conn = connect(&config).unwrap();
            let exists: bool = conn
                .query_row("SELECT EXISTS(SELECT * FROM collages WHERE name = 'All Eyes')", [], |r| r.get(0))
                .unwrap();
            assert!(exists);
        }

        add_release_to_collage(&config, "All Eyes", "ilovecarly").unwrap();
        let disk = fs::read_to_string(&filepath).unwrap();
        assert!(disk.contains("ilovecarly"));
        {
            let conn = connect(&config).unwrap();
            let mut stmt = conn.prepare("SELECT release_id FROM collages_releases WHERE collage_name = 'All Eyes'").unwrap();
            let ids: Vec<String> = stmt.query_map([], |r| r.get(0)).unwrap().map(|r| r.unwrap()).collect();
            assert_eq!(ids, vec!["ilovecarly".to_string()]);
        }

        add_release_to_collage(&config, "All Eyes", "ilovenewjeans").unwrap();
        let disk = fs::read_to_string(&filepath).unwrap();
        assert!(disk.contains("ilovecarly") && disk.contains("ilovenewjeans"));

        remove_release_from_collage(&config, "All Eyes", "ilovenewjeans").unwrap();
        let disk = fs::read_to_string(&filepath).unwrap();
        assert!(disk.contains("ilovecarly") && !disk.contains("ilovenewjeans"));
        {
            let conn = connect(&config).unwrap();
            let mut stmt = conn.prepare("SELECT release_id FROM collages_releases WHERE collage_name = 'All Eyes'").unwrap();
            let ids: Vec<String> = stmt.query_map([], |r| r.get(0)).unwrap().map(|r| r.unwrap()).collect();
            assert_eq!(ids, vec!["ilovecarly".to_string()]);
        }

        delete_collage(&config, "All Eyes").unwrap();
        assert!(!filepath.is_file());
        {
            let conn = connect(&config).unwrap();
            let exists: bool = conn
                .query_row("SELECT EXISTS(SELECT * FROM collages WHERE name = 'All Eyes')", [], |r| r.get(0))
                .unwrap();
            assert!(!exists);
        }
    }

    #[test]
    fn test_collage_add_duplicate() {
        let (config, _temp) = setup_test();
        insert_release(&config, "ilovenewjeans", "NewJeans Release");
        create_collage(&config, "All Eyes").unwrap();
        add_release_to_collage(&config, "All Eyes", "ilovenewjeans").unwrap();
        add_release_to_collage(&config, "All Eyes", "ilovenewjeans").unwrap();

        let filepath = config.music_source_dir.join("!collages").join("All Eyes.toml");
        let data: toml::Value = toml::from_str(&fs::read_to_string(&filepath).unwrap()).unwrap();
        assert_eq!(data["releases"].as_array().unwrap().len(), 1);

        let conn = connect(&config).unwrap();
        let mut stmt = conn.prepare("SELECT * FROM collages_releases WHERE collage_name = 'All Eyes'").unwrap();
        let count = stmt.query_map([], |_| Ok(())).unwrap().count();
        assert_eq!(count, 1);
    }

    #[test]
    fn test_rename_collage() {
        let (config, _temp) = setup_test();
        write_collage(&config, "Rose Gold", "");
        fs::write(config.music_source_dir.join("!collages").join("Rose Gold.txt"), "").unwrap();

        rename_collage(&config, "Rose Gold", "Black Pink").unwrap();
        assert!(!config.music_source_dir.join("!collages").join("Rose Gold.toml").exists());
        assert!(!config.music_source_dir.join("!collages").join("Rose Gold.txt").exists());
        assert!(config.music_source_dir.join("!collages").join("Black Pink.toml").exists());
        assert!(config.music_source_dir.join("!collages").join("Black Pink.txt").exists());

        let conn = connect(&config).unwrap();
        let exists: bool = conn
            .query_row("SELECT EXISTS(SELECT * FROM collages WHERE name = 'Black Pink')", [], |r| r.get(0))
            .unwrap();
        assert!(exists);
        let exists: bool = conn
            .query_row("SELECT EXISTS(SELECT * FROM collages WHERE name = 'Rose Gold')", [], |r| r.get(0))
            .unwrap();
        assert!(!exists);
    }

    #[test]
    fn test_create_collage_already_exists() {
        let (config, _temp) = setup_test();
        create_collage(&config, "Rose Gold").unwrap();
        let err = create_collage(&config, "Rose Gold").unwrap_err();
        assert!(matches!(
            err,
            crate::error::RoseError::Expected(crate::error::RoseExpectedError::CollageAlreadyExists { .. })
        ));
    }

    #[test]
    fn test_delete_collage_does_not_exist() {
        let (config, _temp) = setup_test();
        let err = delete_collage(&config, "Does Not Exist").unwrap_err();
        assert!(matches!(
            err,
            crate::error::RoseError::Expected(crate::error::RoseExpectedError::CollageDoesNotExist { .. })
        ));
    }

    #[test]
    fn test_add_release_to_collage_nonexistent_release() {
        let (config, _temp) = setup_test();
        create_collage(&config, "Rose Gold").unwrap();
        let err = add_release_to_collage(&config, "Rose Gold", "ghost").unwrap_err();
        assert!(matches!(
            err,
            crate::error::RoseError::Expected(crate::error::RoseExpectedError::ReleaseDoesNotExist { .. })
        ));
    }

    #[test]
    fn test_collage_handle_missing_release() {
        let (config, _temp) = setup_test();
        insert_release(&config, "ilovecarly", "Carly Release");
        insert_release(&config, "ilovenewjeans", "NewJeans Release");

        let filepath = config.music_source_dir.join("!collages").join("Black Pink.toml");
        fs::write(
            &filepath,
            r#"[[releases]]
uuid = "ilovecarly"
description_meta = "lalala"
[[releases]]
uuid = "ghost"
description_meta = "lalala {MISSING}"
missing = true
"#,
        )
        .unwrap();
        crate::cache_update::update_cache(&config, false).unwrap();

        // Adding another release to a collage with a missing entry should work fine.
        add_release_to_collage(&config, "Black Pink", "ilovenewjeans").unwrap();
        let data: toml::Value = toml::from_str(&fs::read_to_string(&filepath).unwrap()).unwrap();
        let uuids: std::collections::HashSet<String> =
            data["releases"].as_array().unwrap().iter().map(|r| r["uuid"].as_str().unwrap().to_string()).collect();
        assert_eq!(uuids, ["ghost", "ilovecarly", "ilovenewjeans"].iter().map(|s| s.to_string()).collect());
        let ghost = data["releases"].as_array().unwrap().iter().find(|r| r["uuid"].as_str() == Some("ghost")).unwrap();
        assert_eq!(ghost["missing"].as_bool(), Some(true));

        {
            let conn = connect(&config).unwrap();
            let mut stmt = conn.prepare("SELECT release_id FROM collages_releases WHERE collage_name = 'Black Pink'").unwrap();
            let ids: std::collections::HashSet<String> = stmt.query_map([], |r| r.get(0)).unwrap().map(|r| r.unwrap()).collect();
            assert_eq!(ids, ["ghost", "ilovecarly", "ilovenewjeans"].iter().map(|s| s.to_string()).collect());
        }

        remove_release_from_collage(&config, "Black Pink", "ilovenewjeans").unwrap();
        let data: toml::Value = toml::from_str(&fs::read_to_string(&filepath).unwrap()).unwrap();
        let uuids: std::collections::HashSet<String> =
            data["releases"].as_array().unwrap().iter().map(|r| r["uuid"].as_str().unwrap().to_string()).collect();
        assert_eq!(uuids, ["ghost", "ilovecarly"].iter().map(|s| s.to_string()).collect());

        delete_collage(&config, "Black Pink").unwrap();
        assert!(!filepath.is_file());
        let conn = connect(&config).unwrap();
        let exists: bool = conn
            .query_row("SELECT EXISTS(SELECT * FROM collages WHERE name = 'Black Pink')", [], |r| r.get(0))
            .unwrap();
        assert!(!exists);
    }
}
