#[cfg(test)]
mod tests {
    use crate::cache::connect;
    use crate::config::Config;
    use crate::test_utils::test_utils::create_test_config;
    use crate::virtualfs::{RoseLogicalCore, VirtualPath, ALL_TRACKS};
    use rusqlite::params;
    use tempfile::TempDir;

    fn setup_test() -> (Config, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let config = create_test_config(&temp_dir);
        std::fs::create_dir_all(&config.music_source_dir).unwrap();
        std::fs::create_dir_all(&config.cache_dir).unwrap();
        crate::cache::maybe_invalidate_cache_database(&config).unwrap();
        (config, temp_dir)
    }

    fn insert_release_with_track(config: &Config, release_id: &str, release_title: &str, track_id: &str, track_title: &str) {
        let conn = connect(config).unwrap();
        conn.execute(
            "INSERT INTO releases (id, source_path, added_at, datafile_mtime, title, releasetype, disctotal, new, metahash)
             VALUES (?1, ?2, '0000-01-01T00:00:00+00:00', '999', ?3, 'album', 1, false, 'h')",
            params![release_id, config.music_source_dir.join(release_id).to_string_lossy().to_string(), release_title],
        )
        .unwrap();
        conn.execute(
            "INSERT INTO tracks (id, source_path, source_mtime, title, release_id, tracknumber, tracktotal, discnumber, duration_seconds, metahash)
             VALUES (?1, ?2, '999', ?3, ?4, '1', 1, '1', 120, 'h')",
            params![
                track_id,
                config.music_source_dir.join(format!("{track_id}.mp3")).to_string_lossy().to_string(),
                track_title,
                release_id
            ],
        )
        .unwrap();
    }

    #[test]
    fn test_parse_root() {
        let vp = VirtualPath::parse("/").unwrap();
        assert_eq!(vp.view, Some(crate::virtualfs::View::Root));
    }

    #[test]
    fn test_parse_release_and_track() {
        let vp = VirtualPath::parse("/1. Releases/Some Release/01. Some Track.mp3").unwrap();
        assert_eq!(vp.view, Some(crate::virtualfs::View::Releases));
        assert_eq!(vp.release.as_deref(), Some("Some Release"));
        assert_eq!(vp.file.as_deref(), Some("01. Some Track.mp3"));
    }

    #[test]
    fn test_parse_unknown_top_level_errors() {
        assert!(VirtualPath::parse("/nonexistent view/foo").is_err());
    }

    #[test]
    fn test_readdir_root_lists_all_views() {
        let (config, _temp) = setup_test();
        let core = RoseLogicalCore::new(config);
        let entries = core.readdir(&VirtualPath::root()).unwrap();
        let names: Vec<&str> = entries.iter().map(|(n, _)| n.as_str()).collect();
        assert!(names.contains(&"1. Releases"));
        assert!(names.contains(&"7. Playlists"));
        assert!(names.contains(&"6. Collages"));
    }

    #[test]
    fn test_readdir_releases_lists_release_and_all_tracks() {
        let (config, _temp) = setup_test();
        insert_release_with_track(&config, "rls-1", "My Album", "trk-1", "My Track");
        let core = RoseLogicalCore::new(config);

        let releases_dir = VirtualPath { view: Some(crate::virtualfs::View::Releases), ..Default::default() };
        let entries = core.readdir(&releases_dir).unwrap();
        let names: Vec<&str> = entries.iter().map(|(n, _)| n.as_str()).collect();
        assert!(names.contains(&ALL_TRACKS));
        assert!(names.iter().any(|n| n.contains("My Album")));
    }

    #[test]
    fn test_getattr_and_readdir_into_release() {
        let (config, _temp) = setup_test();
        insert_release_with_track(&config, "rls-1", "My Album", "trk-1", "My Track");
        let core = RoseLogicalCore::new(config);

        let releases_dir = VirtualPath { view: Some(crate::virtualfs::View::Releases), ..Default::default() };
        let entries = core.readdir(&releases_dir).unwrap();
        let (_, release_vname) = entries
            .into_iter()
            .find(|(n, _)| n != "." && n != ".." && n != ALL_TRACKS)
            .unwrap();

        let release_path = VirtualPath { view: Some(crate::virtualfs::View::Releases), release: Some(release_vname.clone()), ..Default::default() };
        let stat = core.getattr(&release_path).unwrap();
        assert_eq!(stat.kind, crate::virtualfs::EntryKind::Dir);

        let track_entries = core.readdir(&release_path).unwrap();
        let track_entry = track_entries.into_iter().find(|(n, _)| n.contains("My Track"));
        assert!(track_entry.is_some());
    }

    #[test]
    fn test_getattr_nonexistent_release_errors() {
        let (config, _temp) = setup_test();
        let core = RoseLogicalCore::new(config);
        let p = VirtualPath { view: Some(crate::virtualfs::View::Releases), release: Some("Ghost".to_string()), ..Default::default() };
        assert!(core.getattr(&p).is_err());
    }

    #[test]
    fn test_mkdir_and_rmdir_collage() {
        let (config, _temp) = setup_test();
        let core = RoseLogicalCore::new(config);
        let p = VirtualPath { view: Some(crate::virtualfs::View::Collages), collage: Some("My Collage".to_string()), ..Default::default() };
        core.mkdir(&p).unwrap();
        let entries = core.readdir(&VirtualPath { view: Some(crate::virtualfs::View::Collages), ..Default::default() }).unwrap();
        assert!(entries.iter().any(|(n, _)| n == "My Collage"));

        core.rmdir(&p).unwrap();
        let entries = core.readdir(&VirtualPath { view: Some(crate::virtualfs::View::Collages), ..Default::default() }).unwrap();
        assert!(!entries.iter().any(|(n, _)| n == "My Collage"));
    }
}
