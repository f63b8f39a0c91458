use crate::{
    Result,
    constants::{CARD_IMAGE_LEN, TRACK_COUNT, TRACK_LEN},
    error::Error,
};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Where the card physically sits inside the reader unit.
///
/// The position drives both status-byte encoding and command legality:
/// Read and Write refuse to run while the card is absent or on its way out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CardPosition {
    /// No card anywhere in the unit.
    NotInserted,

    /// Card sitting in the front slot, not yet pulled in.
    InsertedInFront,

    /// Card positioned under the thermal print head.
    UnderPrintHead,

    /// Card positioned under the magnetic head.
    UnderReader,

    /// Fresh card being fed from the dispenser stack at the back.
    DispensingFromBack,

    /// Card travelling out of the front slot. Completes on the next poll.
    Ejecting,
}

impl fmt::Display for CardPosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CardPosition::NotInserted => "NotInserted",
            CardPosition::InsertedInFront => "InsertedInFront",
            CardPosition::UnderPrintHead => "UnderPrintHead",
            CardPosition::UnderReader => "UnderReader",
            CardPosition::DispensingFromBack => "DispensingFromBack",
            CardPosition::Ejecting => "Ejecting",
        };
        write!(f, "{}", s)
    }
}

impl CardPosition {
    /// Returns `true` while a card is physically held by the unit.
    pub fn has_card(self) -> bool {
        !matches!(self, CardPosition::NotInserted)
    }

    /// Returns `true` when the card cannot be read or written: either it is
    /// absent or already leaving the unit.
    pub fn is_unavailable(self) -> bool {
        matches!(self, CardPosition::NotInserted | CardPosition::Ejecting)
    }
}

/// Card status byte reported by readers without a shutter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum CardStatus {
    NoCard = 0x30,
    HasCard = 0x31,
    CardError = 0x32,
    HasCardRear = 0x33,
    Ejecting = 0x34,
}

impl CardStatus {
    pub fn as_byte(self) -> u8 {
        self as u8
    }
}

/// Device-health status byte reported alongside every poll reply.
///
/// The emulator only ever reports `NoError`, but the full code set is part
/// of the unit's reporting surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ReaderStatus {
    NoError = 0x30,
    ReadError = 0x31,
    WriteError = 0x32,
    CardJam = 0x33,
    MotorError = 0x34,
    PrintError = 0x35,
    IllegalError = 0x38,
    BatteryError = 0x40,
    SystemError = 0x41,
    Track1ReadError = 0x51,
    Track2ReadError = 0x52,
    Track3ReadError = 0x53,
    Track1And2ReadError = 0x54,
    Track1And3ReadError = 0x55,
    Track2And3ReadError = 0x56,
}

impl ReaderStatus {
    pub fn as_byte(self) -> u8 {
        self as u8
    }
}

/// Command-execution status byte reported alongside every poll reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum JobStatus {
    NoJob = 0x30,
    IllegalCommand = 0x32,
    RunningCommand = 0x33,
    WaitingForCard = 0x34,
    DispenserEmpty = 0x35,
    NoDispenser = 0x36,
    CardFull = 0x37,
}

impl JobStatus {
    pub fn as_byte(self) -> u8 {
        self as u8
    }
}

/// Command bytes the board sends inside framed packets.
///
/// The numeric values are fixed by the reader firmware and preserved
/// bit-for-bit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Command {
    Init = 0x10,
    GetStatus = 0x20,
    Read = 0x33,
    Cancel = 0x40,
    Write = 0x53,
    SetPrintParam = 0x78,
    RegisterFont = 0x7A,
    Print = 0x7C,
    Erase = 0x7D,
    EjectCard = 0x80,
    CleanCard = 0xA0,
    NewCard = 0xB0,
    SetShutter = 0xD0,
}

impl Command {
    /// Decode a command byte.
    ///
    /// # Errors
    /// Returns `Error::UnknownCommand` for any byte outside the command set.
    /// The dispatch loop treats that as fatal: the unit has no defined
    /// recovery for a command it does not know.
    pub fn from_byte(code: u8) -> Result<Self> {
        match code {
            0x10 => Ok(Command::Init),
            0x20 => Ok(Command::GetStatus),
            0x33 => Ok(Command::Read),
            0x40 => Ok(Command::Cancel),
            0x53 => Ok(Command::Write),
            0x78 => Ok(Command::SetPrintParam),
            0x7A => Ok(Command::RegisterFont),
            0x7C => Ok(Command::Print),
            0x7D => Ok(Command::Erase),
            0x80 => Ok(Command::EjectCard),
            0xA0 => Ok(Command::CleanCard),
            0xB0 => Ok(Command::NewCard),
            0xD0 => Ok(Command::SetShutter),
            code => Err(Error::UnknownCommand { code }),
        }
    }

    pub fn as_byte(self) -> u8 {
        self as u8
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Command::Init => "Init",
            Command::GetStatus => "GetStatus",
            Command::Read => "Read",
            Command::Cancel => "Cancel",
            Command::Write => "Write",
            Command::SetPrintParam => "SetPrintParam",
            Command::RegisterFont => "RegisterFont",
            Command::Print => "Print",
            Command::Erase => "Erase",
            Command::EjectCard => "EjectCard",
            Command::CleanCard => "CleanCard",
            Command::NewCard => "NewCard",
            Command::SetShutter => "SetShutter",
        };
        write!(f, "{}", s)
    }
}

/// Set of tracks addressed by a Read or Write command.
///
/// The selector is an ASCII digit: `'0'`, `'1'`, `'2'` address a single
/// track (indices 0, 1, 2), `'3'` the first two, `'4'` the outer two,
/// `'5'` the last two and `'6'` all three. Selected tracks are always
/// processed in ascending index order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrackSelection {
    mask: [bool; TRACK_COUNT],
}

impl TrackSelection {
    /// Selection addressing no tracks.
    pub const EMPTY: TrackSelection = TrackSelection {
        mask: [false; TRACK_COUNT],
    };

    /// Decode an ASCII selector digit.
    ///
    /// # Errors
    /// Returns `Error::InvalidTrackSelector` for anything outside `'0'..='6'`.
    ///
    /// # Examples
    /// ```
    /// use magcard_core::TrackSelection;
    ///
    /// let sel = TrackSelection::from_selector(b'3').unwrap();
    /// assert_eq!(sel.indices().collect::<Vec<_>>(), vec![0, 1]);
    /// assert!(TrackSelection::from_selector(b'9').is_err());
    /// ```
    pub fn from_selector(code: u8) -> Result<Self> {
        let mask = match code {
            b'0' => [true, false, false],
            b'1' => [false, true, false],
            b'2' => [false, false, true],
            b'3' => [true, true, false],
            b'4' => [true, false, true],
            b'5' => [false, true, true],
            b'6' => [true, true, true],
            code => return Err(Error::InvalidTrackSelector { code }),
        };
        Ok(TrackSelection { mask })
    }

    /// Selected track indices in ascending order.
    pub fn indices(&self) -> impl Iterator<Item = usize> + '_ {
        self.mask
            .iter()
            .enumerate()
            .filter(|&(_, &selected)| selected)
            .map(|(i, _)| i)
    }

    pub fn contains(&self, index: usize) -> bool {
        index < TRACK_COUNT && self.mask[index]
    }

    pub fn count(&self) -> usize {
        self.mask.iter().filter(|&&s| s).count()
    }

    pub fn is_empty(&self) -> bool {
        self.count() == 0
    }
}

/// The three magnetic tracks of one card, 69 bytes each.
///
/// A `TrackSet` round-trips to the 207-byte flat image persisted on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackSet {
    tracks: [[u8; TRACK_LEN]; TRACK_COUNT],
}

impl TrackSet {
    /// A blank card: all three tracks zeroed.
    pub fn new() -> Self {
        TrackSet {
            tracks: [[0u8; TRACK_LEN]; TRACK_COUNT],
        }
    }

    /// Rebuild a track set from a persisted card image.
    ///
    /// # Errors
    /// Returns `Error::InvalidCardImage` unless the image is exactly
    /// 207 bytes. Partial images are never read into the tracks.
    pub fn from_image(image: &[u8]) -> Result<Self> {
        if image.len() != CARD_IMAGE_LEN {
            return Err(Error::InvalidCardImage {
                expected: CARD_IMAGE_LEN,
                actual: image.len(),
            });
        }
        let mut set = TrackSet::new();
        for (i, chunk) in image.chunks_exact(TRACK_LEN).enumerate() {
            set.tracks[i].copy_from_slice(chunk);
        }
        Ok(set)
    }

    /// Flatten to the 207-byte persisted image.
    pub fn to_image(&self) -> Vec<u8> {
        let mut image = Vec::with_capacity(CARD_IMAGE_LEN);
        for track in &self.tracks {
            image.extend_from_slice(track);
        }
        image
    }

    /// Zero every track.
    pub fn erase(&mut self) {
        self.tracks = [[0u8; TRACK_LEN]; TRACK_COUNT];
    }

    pub fn track(&self, index: usize) -> Option<&[u8]> {
        self.tracks.get(index).map(|t| t.as_slice())
    }

    /// Append the selected tracks to `out` in ascending track order.
    pub fn copy_selected(&self, selection: &TrackSelection, out: &mut Vec<u8>) {
        for index in selection.indices() {
            out.extend_from_slice(&self.tracks[index]);
        }
    }

    /// Overwrite the selected tracks from `data`, consuming exactly 69 bytes
    /// per selected track in ascending track order.
    ///
    /// # Errors
    /// Returns `Error::WriteDataTooShort` without touching any track when
    /// `data` cannot cover the whole selection.
    pub fn write_selected(&mut self, selection: &TrackSelection, data: &[u8]) -> Result<()> {
        let expected = selection.count() * TRACK_LEN;
        if data.len() < expected {
            return Err(Error::WriteDataTooShort {
                expected,
                actual: data.len(),
            });
        }
        for (slot, index) in selection.indices().enumerate() {
            let start = slot * TRACK_LEN;
            self.tracks[index].copy_from_slice(&data[start..start + TRACK_LEN]);
        }
        Ok(())
    }
}

impl Default for TrackSet {
    fn default() -> Self {
        Self::new()
    }
}
