#[cfg(test)]
mod tests {
    use crate::testing;
    use crate::vfs_bridge::{errno_for, normalize, InodeTable, RoseFs};
    use crate::virtualfs::VirtualPath;
    use std::ffi::OsStr;
    use std::path::Path;

    #[test]
    fn test_owning_release_dir_for_track_under_releases() {
        let (config, _tmp) = testing::seeded_cache();
        let source_dir = config.music_source_dir.clone();
        let fs = RoseFs::new(config);

        let vpath = VirtualPath::parse("/1. Releases/Release 1/01. Track 1.m4a").unwrap();
        let dir = fs.owning_release_dir(&vpath).expect("track should resolve to its release");
        assert_eq!(dir, source_dir.join("r1"));
    }

    #[test]
    fn test_owning_release_dir_for_track_under_all_tracks() {
        let (config, _tmp) = testing::seeded_cache();
        let source_dir = config.music_source_dir.clone();
        let fs = RoseFs::new(config);

        let vpath = VirtualPath::parse("/1. Releases/!All Tracks/01. Track 1.m4a").unwrap();
        let dir = fs.owning_release_dir(&vpath).expect("all-tracks entry should resolve to its release");
        assert_eq!(dir, source_dir.join("r1"));
    }

    #[test]
    fn test_owning_release_dir_for_playlist_track_is_the_track_release_not_the_playlist() {
        let (config, _tmp) = testing::seeded_cache();
        let source_dir = config.music_source_dir.clone();
        let fs = RoseFs::new(config);

        let vpath = VirtualPath::parse("/7. Playlists/Lala Lisa/01. Techno Man & Bass Man - Track 1.m4a").unwrap();
        assert_eq!(fs.owning_release_dir(&vpath), Some(source_dir.join("r1")));
    }

    #[test]
    fn test_owning_release_dir_for_playlist_cover_is_none() {
        let (config, _tmp) = testing::seeded_cache();
        let fs = RoseFs::new(config);

        let vpath = VirtualPath::parse("/7. Playlists/Lala Lisa/cover.jpg").unwrap();
        assert_eq!(fs.owning_release_dir(&vpath), None);
    }

    #[test]
    fn test_open_impl_passes_through_existing_release_file() {
        let (config, _tmp) = testing::seeded_cache();
        let fs = RoseFs::new(config);

        let path = Path::new("/1. Releases/Release 1/01. Track 1.m4a");
        let vpath = VirtualPath::parse(path.to_str().unwrap()).unwrap();
        let fh = fs.open_impl(&vpath, path, libc::O_RDONLY).expect("open should succeed");
        assert!(fh >= 2, "a real file handle should never collide with the dev-null sentinel");
    }

    #[test]
    fn test_open_impl_on_missing_path_is_enoent() {
        let (config, _tmp) = testing::seeded_cache();
        let fs = RoseFs::new(config);

        let path = Path::new("/1. Releases/Does Not Exist/track.m4a");
        let vpath = VirtualPath::parse(path.to_str().unwrap()).unwrap();
        let errno = fs.open_impl(&vpath, path, libc::O_RDONLY).unwrap_err();
        assert_eq!(errno, libc::ENOENT);
    }

    #[test]
    fn test_open_impl_buffers_new_release_cover_art_creation() {
        let (config, _tmp) = testing::seeded_cache();
        let fs = RoseFs::new(config);

        let path = Path::new("/1. Releases/Release 1/cover.jpg");
        let vpath = VirtualPath::parse(path.to_str().unwrap()).unwrap();
        let fh = fs.open_impl(&vpath, path, libc::O_CREAT | libc::O_WRONLY).expect("classify should succeed");
        assert!(fh >= 2);
    }

    #[test]
    fn test_open_impl_for_collage_addition_marker_fires_immediately_and_returns_dev_null() {
        let (config, _tmp) = testing::seeded_cache();
        let check_config = config.clone();
        let fs = RoseFs::new(config);

        let path = Path::new("/6. Collages/Rose Gold/Release 3/.rose.r3.toml");
        let vpath = VirtualPath::parse(path.to_str().unwrap()).unwrap();
        let fh = fs.open_impl(&vpath, path, libc::O_CREAT | libc::O_WRONLY).expect("classify should succeed");
        assert_eq!(fh, 1, "a collage-addition open should black-hole writes via the dev-null handle");
        assert!(crate::cache::release_within_collage(&check_config, "r3", "Rose Gold").unwrap());
    }

    #[test]
    fn test_normalize_collapses_dot_and_dotdot() {
        assert_eq!(normalize(Path::new("/1. Releases/../2. Artists")), Path::new("/2. Artists"));
        assert_eq!(normalize(Path::new("/1. Releases/./Foo")), Path::new("/1. Releases/Foo"));
        assert_eq!(normalize(Path::new("/../../etc")), Path::new("/etc"));
    }

    #[test]
    fn test_errno_for_maps_not_found_to_enoent() {
        use crate::error::{RoseError, RoseExpectedError};
        let err = RoseError::Expected(RoseExpectedError::ReleaseDoesNotExist { id: "r1".to_string() });
        assert_eq!(errno_for(&err), libc::ENOENT);
    }

    #[test]
    fn test_errno_for_maps_already_exists_to_eexist() {
        use crate::error::{RoseError, RoseExpectedError};
        let err = RoseError::Expected(RoseExpectedError::PlaylistAlreadyExists { name: "p".to_string() });
        assert_eq!(errno_for(&err), libc::EEXIST);
    }

    #[test]
    fn test_errno_for_falls_back_to_eio() {
        use crate::error::RoseError;
        let err = RoseError::Unexpected("boom".to_string());
        assert_eq!(errno_for(&err), libc::EIO);
    }

    #[test]
    fn test_inode_table_assigns_and_forgets_paths() {
        let inodes = InodeTable::new();
        let root = fuser::FUSE_ROOT_ID;
        assert_eq!(inodes.path_for(root).as_deref(), Some(Path::new("/")));

        let child = inodes.child_path(root, OsStr::new("1. Releases")).unwrap();
        let ino = inodes.calc_inode(&child);
        assert_eq!(inodes.calc_inode(&child), ino, "repeated lookups of the same path keep its inode");

        inodes.rename_path(&child, Path::new("/Renamed"));
        assert_eq!(inodes.path_for(ino).as_deref(), Some(Path::new("/Renamed")));

        inodes.remove_path(Path::new("/Renamed"));
        assert!(inodes.path_for(ino).is_none());
    }
}
