use crate::boxes::FourCC;

/// Names for common MP4 / F4V box types, used for display.
///
/// Anything not in this list becomes `KnownBox::Unknown(fourcc)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KnownBox {
    // File-level / top-level
    Ftyp,
    Styp,
    Pdin,
    Moov,
    Moof,
    Mdat,
    Free,
    Skip,
    Wide,
    Meta,
    Mfra,
    Pssh,
    Sidx,

    // Adobe HDS / F4V
    Abst,
    Asrt,
    Afrt,
    Afra,

    // moov / trak / mdia / minf
    Mvhd,
    Trak,
    Mvex,
    Udta,
    Tkhd,
    Edts,
    Elst,
    Mdia,
    Mdhd,
    Hdlr,
    Minf,
    Vmhd,
    Smhd,
    Dinf,
    Dref,
    Stbl,

    // stbl children
    Stsd,
    Stts,
    Ctts,
    Stsc,
    Stsz,
    Stco,
    Co64,
    Stss,

    // fragments
    Mehd,
    Trex,
    Mfhd,
    Traf,
    Tfhd,
    Tfdt,
    Trun,
    Tfra,
    Mfro,

    // protection
    Sinf,
    Schm,
    Schi,
    Tenc,

    // Raw UUID/vendor
    Uuid,

    // Anything else
    Unknown(FourCC),
}

impl From<FourCC> for KnownBox {
    fn from(cc: FourCC) -> Self {
        match &cc.0 {
            b"ftyp" => KnownBox::Ftyp,
            b"styp" => KnownBox::Styp,
            b"pdin" => KnownBox::Pdin,
            b"moov" => KnownBox::Moov,
            b"moof" => KnownBox::Moof,
            b"mdat" => KnownBox::Mdat,
            b"free" => KnownBox::Free,
            b"skip" => KnownBox::Skip,
            b"wide" => KnownBox::Wide,
            b"meta" => KnownBox::Meta,
            b"mfra" => KnownBox::Mfra,
            b"pssh" => KnownBox::Pssh,
            b"sidx" => KnownBox::Sidx,

            b"abst" => KnownBox::Abst,
            b"asrt" => KnownBox::Asrt,
            b"afrt" => KnownBox::Afrt,
            b"afra" => KnownBox::Afra,

            b"mvhd" => KnownBox::Mvhd,
            b"trak" => KnownBox::Trak,
            b"mvex" => KnownBox::Mvex,
            b"udta" => KnownBox::Udta,
            b"tkhd" => KnownBox::Tkhd,
            b"edts" => KnownBox::Edts,
            b"elst" => KnownBox::Elst,
            b"mdia" => KnownBox::Mdia,
            b"mdhd" => KnownBox::Mdhd,
            b"hdlr" => KnownBox::Hdlr,
            b"minf" => KnownBox::Minf,
            b"vmhd" => KnownBox::Vmhd,
            b"smhd" => KnownBox::Smhd,
            b"dinf" => KnownBox::Dinf,
            b"dref" => KnownBox::Dref,
            b"stbl" => KnownBox::Stbl,

            b"stsd" => KnownBox::Stsd,
            b"stts" => KnownBox::Stts,
            b"ctts" => KnownBox::Ctts,
            b"stsc" => KnownBox::Stsc,
            b"stsz" => KnownBox::Stsz,
            b"stco" => KnownBox::Stco,
            b"co64" => KnownBox::Co64,
            b"stss" => KnownBox::Stss,

            b"mehd" => KnownBox::Mehd,
            b"trex" => KnownBox::Trex,
            b"mfhd" => KnownBox::Mfhd,
            b"traf" => KnownBox::Traf,
            b"tfhd" => KnownBox::Tfhd,
            b"tfdt" => KnownBox::Tfdt,
            b"trun" => KnownBox::Trun,
            b"tfra" => KnownBox::Tfra,
            b"mfro" => KnownBox::Mfro,

            b"sinf" => KnownBox::Sinf,
            b"schm" => KnownBox::Schm,
            b"schi" => KnownBox::Schi,
            b"tenc" => KnownBox::Tenc,

            b"uuid" => KnownBox::Uuid,

            _ => KnownBox::Unknown(cc),
        }
    }
}

impl KnownBox {
    pub fn full_name(&self) -> &'static str {
        match self {
            KnownBox::Ftyp => "File Type Box",
            KnownBox::Styp => "Segment Type Box",
            KnownBox::Pdin => "Progressive Download Information Box",
            KnownBox::Moov => "Movie Box",
            KnownBox::Moof => "Movie Fragment Box",
            KnownBox::Mdat => "Media Data Box",
            KnownBox::Free => "Free Space Box",
            KnownBox::Skip => "Skip Box",
            KnownBox::Wide => "Wide Box",
            KnownBox::Meta => "Meta Box",
            KnownBox::Mfra => "Movie Fragment Random Access Box",
            KnownBox::Pssh => "Protection System Specific Header Box",
            KnownBox::Sidx => "Segment Index Box",
            KnownBox::Abst => "Bootstrap Info Box",
            KnownBox::Asrt => "Segment Run Table Box",
            KnownBox::Afrt => "Fragment Run Table Box",
            KnownBox::Afra => "Fragment Random Access Box",
            KnownBox::Mvhd => "Movie Header Box",
            KnownBox::Trak => "Track Box",
            KnownBox::Mvex => "Movie Extends Box",
            KnownBox::Udta => "User Data Box",
            KnownBox::Tkhd => "Track Header Box",
            KnownBox::Edts => "Edit Box",
            KnownBox::Elst => "Edit List Box",
            KnownBox::Mdia => "Media Box",
            KnownBox::Mdhd => "Media Header Box",
            KnownBox::Hdlr => "Handler Reference Box",
            KnownBox::Minf => "Media Information Box",
            KnownBox::Vmhd => "Video Media Header Box",
            KnownBox::Smhd => "Sound Media Header Box",
            KnownBox::Dinf => "Data Information Box",
            KnownBox::Dref => "Data Reference Box",
            KnownBox::Stbl => "Sample Table Box",
            KnownBox::Stsd => "Sample Description Box",
            KnownBox::Stts => "Decoding Time to Sample Box",
            KnownBox::Ctts => "Composition Time to Sample Box",
            KnownBox::Stsc => "Sample To Chunk Box",
            KnownBox::Stsz => "Sample Size Box",
            KnownBox::Stco => "Chunk Offset Box",
            KnownBox::Co64 => "64-bit Chunk Offset Box",
            KnownBox::Stss => "Sync Sample Box",
            KnownBox::Mehd => "Movie Extends Header Box",
            KnownBox::Trex => "Track Extends Box",
            KnownBox::Mfhd => "Movie Fragment Header Box",
            KnownBox::Traf => "Track Fragment Box",
            KnownBox::Tfhd => "Track Fragment Header Box",
            KnownBox::Tfdt => "Track Fragment Decode Time Box",
            KnownBox::Trun => "Track Fragment Run Box",
            KnownBox::Tfra => "Track Fragment Random Access Box",
            KnownBox::Mfro => "Movie Fragment Random Access Offset Box",
            KnownBox::Sinf => "Protection Scheme Information Box",
            KnownBox::Schm => "Scheme Type Box",
            KnownBox::Schi => "Scheme Information Box",
            KnownBox::Tenc => "Track Encryption Box",
            KnownBox::Uuid => "User Extension Box",
            KnownBox::Unknown(_) => "Unknown Box",
        }
    }

    /// Types that may legitimately open an MP4 / F4V file.
    pub fn is_top_level_marker(&self) -> bool {
        matches!(
            self,
            KnownBox::Ftyp
                | KnownBox::Styp
                | KnownBox::Pdin
                | KnownBox::Moov
                | KnownBox::Moof
                | KnownBox::Mdat
                | KnownBox::Free
                | KnownBox::Skip
                | KnownBox::Wide
        )
    }
}
