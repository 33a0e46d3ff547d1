use f4vbox::boxes::FourCC;
use f4vbox::known_boxes::KnownBox;

#[test]
fn known_box_from_ftyp() {
    let cc = FourCC(*b"ftyp");
    let kb = KnownBox::from(cc);
    assert!(matches!(kb, KnownBox::Ftyp));
    assert_eq!(kb.full_name(), "File Type Box");
}

#[test]
fn known_box_names_f4v_types() {
    assert_eq!(KnownBox::from(FourCC(*b"abst")).full_name(), "Bootstrap Info Box");
    assert_eq!(KnownBox::from(FourCC(*b"afra")).full_name(), "Fragment Random Access Box");
}

#[test]
fn unknown_fourcc_is_kept() {
    let kb = KnownBox::from(FourCC(*b"zzzz"));
    assert_eq!(kb, KnownBox::Unknown(FourCC(*b"zzzz")));
    assert_eq!(kb.full_name(), "Unknown Box");
}

#[test]
fn top_level_markers() {
    for cc in [b"ftyp", b"moov", b"free", b"mdat", b"skip"] {
        assert!(KnownBox::from(FourCC(*cc)).is_top_level_marker(), "{:?}", cc);
    }
    for cc in [b"trak", b"mvhd", b"uuid", b"zzzz"] {
        assert!(!KnownBox::from(FourCC(*cc)).is_top_level_marker(), "{:?}", cc);
    }
}
