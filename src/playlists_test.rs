#[cfg(test)]
mod tests {
    use crate::cache::connect;
    use crate::config::Config;
    use crate::playlists::{
        add_track_to_playlist, create_playlist, delete_playlist, delete_playlist_cover_art, edit_playlist_in_editor,
        remove_track_from_playlist, rename_playlist, set_playlist_cover_art,
    };
    use crate::test_utils::test_utils::create_test_config;
    use rusqlite::params;
    use std::fs;
    use tempfile::TempDir;

    fn setup_test() -> (Config, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let config = create_test_config(&temp_dir);
        fs::create_dir_all(&config.music_source_dir).unwrap();
        fs::create_dir_all(&config.cache_dir).unwrap();
        fs::create_dir_all(config.music_source_dir.join("!playlists")).unwrap();
        crate::cache::maybe_invalidate_cache_database(&config).unwrap();
        (config, temp_dir)
    }

    fn insert_track(config: &Config, id: &str, title: &str) {
        let conn = connect(config).unwrap();
        conn.execute(
            "INSERT INTO releases (id, source_path, added_at, datafile_mtime, title, releasetype, disctotal, new, metahash)
             VALUES ('rls-' || ?1, ?2, '0000-01-01T00:00:00+00:00', '999', 'Release', 'album', 1, false, 'h')",
            params![id, config.music_source_dir.join(format!("rls-{id}")).to_string_lossy().to_string()],
        )
        .unwrap();
        conn.execute(
            "INSERT INTO tracks (id, source_path, source_mtime, title, release_id, tracknumber, tracktotal, discnumber, duration_seconds, metahash)
             VALUES (?1, ?2, '999', ?3, 'rls-' || ?1, '1', 1, '1', 120, 'h')",
            params![id, config.music_source_dir.join(format!("{id}.mp3")).to_string_lossy().to_string(), title],
        )
        .unwrap();
    }

    fn write_playlist(config: &Config, name: &str, contents: &str) {
        fs::write(config.music_source_dir.join("!playlists").join(format!("{name}.toml")), contents).unwrap();
    }

    #[test]
    fn test_playlist_lifecycle() {
        let (config, _temp) = setup_test();
        insert_track(&config, "ilovecarly", "Carly Track");
        insert_track(&config, "ilovenewjeans", "NewJeans Track");

        let filepath = config.music_source_dir.join("!playlists").join("Lovers Rock.toml");
        assert!(!filepath.exists());
        create_playlist(&config, "Lovers Rock").unwrap();
        assert!(filepath.is_file());
        {
            let conn = connect(&config).unwrap();
            let exists: bool = conn
                .query_row("SELECT EXISTS(SELECT * FROM playlists WHERE name = 'Lovers Rock')", [], |r| r.get(0))
                .unwrap();
            assert!(exists);
        }

        add_track_to_playlist(&config, "Lovers Rock", "ilovecarly").unwrap();
        let disk = fs::read_to_string(&filepath).unwrap();
        assert!(disk.contains("ilovecarly"));

        add_track_to_playlist(&config, "Lovers Rock", "ilovenewjeans").unwrap();
        let disk = fs::read_to_string(&filepath).unwrap();
        assert!(disk.contains("ilovecarly") && disk.contains("ilovenewjeans"));

        delete_playlist(&config, "Lovers Rock").unwrap();
        assert!(!filepath.is_file());
        let conn = connect(&config).unwrap();
        let exists: bool = conn
            .query_row("SELECT EXISTS(SELECT * FROM playlists WHERE name = 'Lovers Rock')", [], |r| r.get(0))
            .unwrap();
        assert!(!exists);
    }

    #[test]
    fn test_remove_track_from_playlist() {
        let (config, _temp) = setup_test();
        insert_track(&config, "ilovecarly", "Carly Track");
        create_playlist(&config, "Lovers Rock").unwrap();
        add_track_to_playlist(&config, "Lovers Rock", "ilovecarly").unwrap();

        remove_track_from_playlist(&config, "Lovers Rock", "ilovecarly").unwrap();
        let filepath = config.music_source_dir.join("!playlists").join("Lovers Rock.toml");
        let disk = fs::read_to_string(&filepath).unwrap();
        assert!(!disk.contains("ilovecarly"));

        let conn = connect(&config).unwrap();
        let count: i64 =
            conn.query_row("SELECT COUNT(*) FROM playlists_tracks WHERE playlist_name = 'Lovers Rock'", [], |r| r.get(0)).unwrap();
        assert_eq!(count, 0);
    }

    #[test]
    fn test_playlist_add_duplicate() {
        let (config, _temp) = setup_test();
        insert_track(&config, "ilovenewjeans", "NewJeans Track");
        create_playlist(&config, "Lovers Rock").unwrap();
        add_track_to_playlist(&config, "Lovers Rock", "ilovenewjeans").unwrap();
        add_track_to_playlist(&config, "Lovers Rock", "ilovenewjeans").unwrap();

        let filepath = config.music_source_dir.join("!playlists").join("Lovers Rock.toml");
        let data: toml::Value = toml::from_str(&fs::read_to_string(&filepath).unwrap()).unwrap();
        assert_eq!(data["tracks"].as_array().unwrap().len(), 1);
    }

    #[test]
    fn test_rename_playlist() {
        let (config, _temp) = setup_test();
        write_playlist(&config, "Rose Gold", "");
        fs::write(config.music_source_dir.join("!playlists").join("Rose Gold.jpg"), "").unwrap();

        rename_playlist(&config, "Rose Gold", "Black Pink").unwrap();
        assert!(!config.music_source_dir.join("!playlists").join("Rose Gold.toml").exists());
        assert!(!config.music_source_dir.join("!playlists").join("Rose Gold.jpg").exists());
        assert!(config.music_source_dir.join("!playlists").join("Black Pink.toml").exists());
        assert!(config.music_source_dir.join("!playlists").join("Black Pink.jpg").exists());
    }

    #[test]
    fn test_edit_playlists_ordering() {
        let (config, _temp) = setup_test();
        insert_track(&config, "a", "Track A");
        insert_track(&config, "b", "Track B");
        create_playlist(&config, "Lovers Rock").unwrap();
        add_track_to_playlist(&config, "Lovers Rock", "a").unwrap();
        add_track_to_playlist(&config, "Lovers Rock", "b").unwrap();

        std::env::set_var("EDITOR", "true");
        edit_playlist_in_editor(&config, "Lovers Rock").unwrap();
        // `true` leaves the temp file untouched, so this is a no-op edit.
        let filepath = config.music_source_dir.join("!playlists").join("Lovers Rock.toml");
        let data: toml::Value = toml::from_str(&fs::read_to_string(&filepath).unwrap()).unwrap();
        assert_eq!(data["tracks"].as_array().unwrap().len(), 2);
    }

    #[test]
    fn test_playlist_handle_missing_track() {
        let (config, _temp) = setup_test();
        insert_track(&config, "ilovecarly", "Carly Track");

        let filepath = config.music_source_dir.join("!playlists").join("Black Pink.toml");
        fs::write(
            &filepath,
            r#"[[tracks]]
uuid = "ilovecarly"
description_meta = "lalala"
[[tracks]]
uuid = "ghost"
description_meta = "lalala {MISSING}"
missing = true
"#,
        )
        .unwrap();
        crate::cache_update::update_cache(&config, false).unwrap();

        let conn = connect(&config).unwrap();
        let count: i64 =
            conn.query_row("SELECT COUNT(*) FROM playlists_tracks WHERE playlist_name = 'Black Pink'", [], |r| r.get(0)).unwrap();
        assert_eq!(count, 2);

        delete_playlist(&config, "Black Pink").unwrap();
        assert!(!filepath.is_file());
    }

    #[test]
    fn test_set_and_remove_playlist_cover_art() {
        let (config, _temp) = setup_test();
        create_playlist(&config, "Lovers Rock").unwrap();

        let cover_src = config.cache_dir.join("new-cover.jpg");
        fs::write(&cover_src, "fake jpg bytes").unwrap();
        set_playlist_cover_art(&config, "Lovers Rock", &cover_src).unwrap();

        let cover_dest = config.music_source_dir.join("!playlists").join("Lovers Rock.jpg");
        assert!(cover_dest.is_file());

        delete_playlist_cover_art(&config, "Lovers Rock").unwrap();
        assert!(!cover_dest.is_file());
    }

    #[test]
    fn test_create_playlist_already_exists() {
        let (config, _temp) = setup_test();
        create_playlist(&config, "Rose Gold").unwrap();
        let err = create_playlist(&config, "Rose Gold").unwrap_err();
        assert!(matches!(
            err,
            crate::error::RoseError::Expected(crate::error::RoseExpectedError::PlaylistAlreadyExists { .. })
        ));
    }

    #[test]
    fn test_delete_playlist_does_not_exist() {
        let (config, _temp) = setup_test();
        let err = delete_playlist(&config, "Does Not Exist").unwrap_err();
        assert!(matches!(
            err,
            crate::error::RoseError::Expected(crate::error::RoseExpectedError::PlaylistDoesNotExist { .. })
        ));
    }
}
