use crate::audiotags::{format_artist_string, normalize_rtype, parse_artist_string, split_tag, RoseDate};
use crate::common::{Artist, ArtistMapping};

#[test]
fn test_split_tag() {
    assert_eq!(split_tag(Some(r"a \\ b")), vec!["a", "b"]);
    assert_eq!(split_tag(Some(r"a \ b")), vec![r"a \ b"]);
    assert_eq!(split_tag(Some("a;b")), vec!["a", "b"]);
    assert_eq!(split_tag(Some("a; b")), vec!["a", "b"]);
    assert_eq!(split_tag(Some("a vs. b")), vec!["a", "b"]);
    assert_eq!(split_tag(Some("a / b")), vec!["a", "b"]);
    assert_eq!(split_tag(None), Vec::<String>::new());
    assert_eq!(split_tag(Some("")), Vec::<String>::new());
}

#[test]
fn test_parse_artist_string() {
    assert_eq!(
        parse_artist_string(Some("A;B feat. C;D"), None, None, None, None, None),
        ArtistMapping {
            main: vec![Artist::new("A".to_string()), Artist::new("B".to_string())],
            guest: vec![Artist::new("C".to_string()), Artist::new("D".to_string())],
            ..Default::default()
        }
    );
    assert_eq!(
        parse_artist_string(Some("A pres. C;D"), None, None, None, None, None),
        ArtistMapping {
            djmixer: vec![Artist::new("A".to_string())],
            main: vec![Artist::new("C".to_string()), Artist::new("D".to_string())],
            ..Default::default()
        }
    );
    assert_eq!(
        parse_artist_string(Some("A performed by C;D"), None, None, None, None, None),
        ArtistMapping {
            composer: vec![Artist::new("A".to_string())],
            main: vec![Artist::new("C".to_string()), Artist::new("D".to_string())],
            ..Default::default()
        }
    );
    assert_eq!(
        parse_artist_string(Some("A pres. B;C feat. D;E"), None, None, None, None, None),
        ArtistMapping {
            djmixer: vec![Artist::new("A".to_string())],
            main: vec![Artist::new("B".to_string()), Artist::new("C".to_string())],
            guest: vec![Artist::new("D".to_string()), Artist::new("E".to_string())],
            ..Default::default()
        }
    );
}

#[test]
fn test_format_artist_string() {
    assert_eq!(
        format_artist_string(&ArtistMapping {
            main: vec![Artist::new("A".to_string()), Artist::new("B".to_string())],
            guest: vec![Artist::new("C".to_string()), Artist::new("D".to_string())],
            ..Default::default()
        }),
        "A;B feat. C;D"
    );
    assert_eq!(
        format_artist_string(&ArtistMapping {
            djmixer: vec![Artist::new("A".to_string())],
            main: vec![Artist::new("C".to_string()), Artist::new("D".to_string())],
            ..Default::default()
        }),
        "A pres. C;D"
    );
    assert_eq!(
        format_artist_string(&ArtistMapping {
            composer: vec![Artist::new("A".to_string())],
            main: vec![Artist::new("C".to_string()), Artist::new("D".to_string())],
            ..Default::default()
        }),
        "A performed by C;D"
    );
    assert_eq!(
        format_artist_string(&ArtistMapping {
            djmixer: vec![Artist::new("A".to_string())],
            main: vec![Artist::new("B".to_string()), Artist::new("C".to_string())],
            guest: vec![Artist::new("D".to_string()), Artist::new("E".to_string())],
            ..Default::default()
        }),
        "A pres. B;C feat. D;E"
    );
}

#[test]
fn test_artist_string_round_trip() {
    let mapping = ArtistMapping {
        main: vec![Artist::new("Main One".to_string()), Artist::new("Main Two".to_string())],
        guest: vec![Artist::new("Guest".to_string())],
        remixer: vec![Artist::new("Remixer".to_string())],
        producer: vec![Artist::new("Producer".to_string())],
        composer: vec![Artist::new("Composer".to_string())],
        conductor: vec![Artist::new("Conductor".to_string())],
        djmixer: vec![Artist::new("DJ".to_string())],
    };
    let formatted = format_artist_string(&mapping);
    let reparsed = parse_artist_string(Some(&formatted), None, None, None, None, None);
    assert_eq!(reparsed.main, mapping.main);
    assert_eq!(reparsed.guest, mapping.guest);
    assert_eq!(reparsed.remixer, mapping.remixer);
    assert_eq!(reparsed.producer, mapping.producer);
    assert_eq!(reparsed.composer, mapping.composer);
    assert_eq!(reparsed.conductor, mapping.conductor);
    assert_eq!(reparsed.djmixer, mapping.djmixer);
}

#[test]
fn test_normalize_rtype() {
    assert_eq!(normalize_rtype(Some("ALBUM")), "album");
    assert_eq!(normalize_rtype(Some("lalala")), "unknown");
    assert_eq!(normalize_rtype(None), "unknown");
    assert_eq!(normalize_rtype(Some("")), "unknown");
}

#[test]
fn test_rose_date_parse() {
    assert_eq!(RoseDate::parse(Some("1990")), Some(RoseDate::new(1990, None, None)));
    assert_eq!(RoseDate::parse(Some("1990-02-05")), Some(RoseDate::new(1990, Some(2), Some(5))));
    assert_eq!(RoseDate::parse(None), None);
    assert_eq!(RoseDate::parse(Some("")), None);
}
