#[cfg(test)]
mod tests {
    use crate::cache::{connect, maybe_invalidate_cache_database};
    use crate::config::Config;
    use crate::datafiles::{read_datafile, write_datafile, StoredDataFile};
    use crate::error::{RoseError, RoseExpectedError};
    use crate::releases::{
        create_single_release, delete_release, delete_release_cover_art, edit_release,
        find_releases_matching_rule, run_actions_on_release, set_release_cover_art,
        toggle_release_new,
    };
    use crate::rule_parser::Matcher;
    use crate::test_utils::test_utils::create_test_config;
    use chrono::Utc;
    use rusqlite::params;
    use std::fs;
    use tempfile::TempDir;

    fn setup_test() -> (Config, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let config = create_test_config(&temp_dir);
        fs::create_dir_all(&config.music_source_dir).unwrap();
        fs::create_dir_all(&config.cache_dir).unwrap();
        maybe_invalidate_cache_database(&config).unwrap();
        (config, temp_dir)
    }

    /// Inserts a bare release row (no tracks) directly into the cache database, mirroring what
    /// the updater would have produced for a one-track release. Returns the release's directory.
    fn insert_release(config: &Config, id: &str, title: &str) -> std::path::PathBuf {
        let dir = config.music_source_dir.join(id);
        fs::create_dir_all(&dir).unwrap();
        let conn = connect(config).unwrap();
        conn.execute(
            "INSERT INTO releases (id, source_path, added_at, datafile_mtime, title, releasetype, disctotal, new, metahash)
             VALUES (?1, ?2, '0000-01-01T00:00:00+00:00', '999', ?3, 'album', 1, false, 'h')",
            params![id, dir.to_string_lossy().to_string(), title],
        )
        .unwrap();
        conn.execute(
            "INSERT INTO releases_artists (release_id, artist, role, position) VALUES (?1, 'Techno Man', 'main', 1)",
            params![id],
        )
        .unwrap();
        dir
    }

    fn fts_token(s: &str) -> String {
        s.chars().map(|c| c.to_string()).collect::<Vec<_>>().join("\u{AC}")
    }

    /// Inserts a bare release with exactly one track row, plus a matching FTS row, so that
    /// `find_releases_matching_rule` has something to search over.
    fn insert_release_with_track(config: &Config, release_id: &str, release_title: &str, track_id: &str, track_title: &str) -> std::path::PathBuf {
        let dir = insert_release(config, release_id, release_title);
        let track_path = dir.join("01.m4a");
        fs::write(&track_path, "").unwrap();
        let conn = connect(config).unwrap();
        conn.execute(
            "INSERT INTO tracks (id, source_path, source_mtime, title, release_id, tracknumber, tracktotal, discnumber, duration_seconds, metahash)
             VALUES (?1, ?2, '999', ?3, ?4, '01', 1, '01', 120, 'h')",
            params![track_id, track_path.to_string_lossy().to_string(), track_title, release_id],
        )
        .unwrap();
        conn.execute(
            "INSERT INTO rules_engine_fts (rowid, tracktitle, releasetitle, releasetype)
             SELECT rowid, ?2, ?3, ?4 FROM tracks WHERE id = ?1",
            params![track_id, fts_token(track_title), fts_token(release_title), fts_token("album")],
        )
        .unwrap();
        dir
    }

    #[test]
    fn test_delete_release() {
        let (config, _temp) = setup_test();
        let dir = insert_release(&config, "ilovecarly", "Carly Release");
        assert!(dir.is_dir());

        delete_release(&config, "ilovecarly").unwrap();

        assert!(!dir.exists());
        let conn = connect(&config).unwrap();
        let exists: bool = conn
            .query_row("SELECT EXISTS(SELECT * FROM releases WHERE id = 'ilovecarly')", [], |r| r.get(0))
            .unwrap();
        assert!(!exists);
    }

    #[test]
    fn test_delete_release_does_not_exist() {
        let (config, _temp) = setup_test();
        let err = delete_release(&config, "ghost").unwrap_err();
        assert!(matches!(
            err,
            RoseError::Expected(RoseExpectedError::ReleaseDoesNotExist { .. })
        ));
    }

    #[test]
    fn test_toggle_release_new() {
        let (config, _temp) = setup_test();
        let dir = insert_release(&config, "ilovecarly", "Carly Release");
        let datafile_path = dir.join(".rose.ilovecarly.toml");
        write_datafile(
            &datafile_path,
            &StoredDataFile {
                new: true,
                added_at: Utc::now().to_rfc3339(),
            },
        )
        .unwrap();

        toggle_release_new(&config, "ilovecarly").unwrap();
        assert!(!read_datafile(&datafile_path).unwrap().new);

        toggle_release_new(&config, "ilovecarly").unwrap();
        assert!(read_datafile(&datafile_path).unwrap().new);
    }

    #[test]
    fn test_set_release_cover_art() {
        let (config, _temp) = setup_test();
        let dir = insert_release(&config, "ilovecarly", "Carly Release");
        let cover_src = config.cache_dir.join("incoming.jpg");
        fs::write(&cover_src, b"not a real jpeg, just bytes").unwrap();

        set_release_cover_art(&config, "ilovecarly", &cover_src).unwrap();

        let dest = dir.join("cover.jpg");
        assert!(dest.is_file());
        assert_eq!(fs::read(&dest).unwrap(), fs::read(&cover_src).unwrap());
    }

    #[test]
    fn test_set_release_cover_art_rejects_bad_extension() {
        let (config, _temp) = setup_test();
        insert_release(&config, "ilovecarly", "Carly Release");
        let cover_src = config.cache_dir.join("incoming.gif");
        fs::write(&cover_src, b"gif bytes").unwrap();

        let err = set_release_cover_art(&config, "ilovecarly", &cover_src).unwrap_err();
        assert!(matches!(
            err,
            RoseError::Expected(RoseExpectedError::InvalidCoverArtFile(_))
        ));
    }

    #[test]
    fn test_delete_release_cover_art() {
        let (config, _temp) = setup_test();
        let dir = insert_release(&config, "ilovecarly", "Carly Release");
        let cover_path = dir.join("cover.jpg");
        fs::write(&cover_path, b"cover bytes").unwrap();

        let conn = connect(&config).unwrap();
        conn.execute(
            "UPDATE releases SET cover_image_path = ?1 WHERE id = 'ilovecarly'",
            params![cover_path.to_string_lossy().to_string()],
        )
        .unwrap();
        drop(conn);

        delete_release_cover_art(&config, "ilovecarly").unwrap();
        assert!(!cover_path.exists());
    }

    #[test]
    fn test_delete_release_cover_art_none_set() {
        let (config, _temp) = setup_test();
        insert_release(&config, "ilovecarly", "Carly Release");
        let err = delete_release_cover_art(&config, "ilovecarly").unwrap_err();
        assert!(matches!(err, RoseError::Expected(RoseExpectedError::Generic(_))));
    }

    #[test]
    fn test_edit_release_no_changes() {
        let (config, _temp) = setup_test();
        insert_release(&config, "ilovecarly", "Carly Release");
        // With $EDITOR a no-op, the round-tripped TOML is unchanged, so `edit_release` should
        // find zero diffs and never touch any track (of which there are none here anyway).
        std::env::set_var("EDITOR", "true");
        edit_release(&config, "ilovecarly", None).unwrap();

        let conn = connect(&config).unwrap();
        let title: String = conn.query_row("SELECT title FROM releases WHERE id = 'ilovecarly'", [], |r| r.get(0)).unwrap();
        assert_eq!(title, "Carly Release");
    }

    #[test]
    fn test_edit_release_failure_and_resume() {
        let (config, _temp) = setup_test();
        insert_release(&config, "ilovecarly", "Carly Release");
        // An editor that exits non-zero should surface as an error and leave the release alone.
        std::env::set_var("EDITOR", "false");
        let err = edit_release(&config, "ilovecarly", None).unwrap_err();
        assert!(matches!(err, RoseError::Expected(RoseExpectedError::Generic(_))));

        let conn = connect(&config).unwrap();
        let title: String = conn.query_row("SELECT title FROM releases WHERE id = 'ilovecarly'", [], |r| r.get(0)).unwrap();
        assert_eq!(title, "Carly Release");
    }

    #[test]
    fn test_run_action_on_release_no_tracks_is_a_noop() {
        let (config, _temp) = setup_test();
        insert_release(&config, "ilovecarly", "Carly Release");
        let matcher = Matcher::parse("tracktitle:x").unwrap();
        let actions = vec![crate::rule_parser::Action::parse("replace:y", 1, Some(&matcher)).unwrap()];

        // No tracks exist for this release, so there is nothing to change and nothing to write.
        run_actions_on_release(&config, "ilovecarly", &actions, false, true).unwrap();
    }

    #[test]
    fn test_run_action_on_release_does_not_exist() {
        let (config, _temp) = setup_test();
        let matcher = Matcher::parse("tracktitle:x").unwrap();
        let actions = vec![crate::rule_parser::Action::parse("replace:y", 1, Some(&matcher)).unwrap()];
        let err = run_actions_on_release(&config, "ghost", &actions, false, true).unwrap_err();
        assert!(matches!(
            err,
            RoseError::Expected(RoseExpectedError::ReleaseDoesNotExist { .. })
        ));
    }

    #[test]
    fn test_create_single_release_track_does_not_exist() {
        let (config, _temp) = setup_test();
        let err = create_single_release(&config, "ghost", None, None).unwrap_err();
        assert!(matches!(
            err,
            RoseError::Expected(RoseExpectedError::TrackDoesNotExist { .. })
        ));
    }

    #[test]
    fn test_find_releases_matching_rule() {
        let (config, _temp) = setup_test();
        insert_release_with_track(&config, "r1", "Rack Attack", "t1", "Track One");
        insert_release_with_track(&config, "r2", "Calm Release", "t2", "Track Two");

        let matcher = Matcher::parse("releasetitle:Rack").unwrap();
        let matches = find_releases_matching_rule(&config, &matcher).unwrap();
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].id, "r1");
    }

    #[test]
    fn test_find_releases_matching_rule_no_hits() {
        let (config, _temp) = setup_test();
        insert_release_with_track(&config, "r1", "Rack Attack", "t1", "Track One");

        let matcher = Matcher::parse("releasetitle:Zzz").unwrap();
        let matches = find_releases_matching_rule(&config, &matcher).unwrap();
        assert!(matches.is_empty());
    }
}
