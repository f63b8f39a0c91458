//! The reader unit's command state machine.
//!
//! Commands arrive as decoded packets, mutate the unit state and queue
//! response data; the substantive reply is only handed to the board on the
//! next poll. Every dispatched command is acknowledged on the wire with a
//! single ACK byte by the owning loop.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use magcard_core::{
    CardPosition, CardStatus, Command, Error, JobStatus, ReaderStatus, Result, TrackSelection,
    TrackSet,
};
use magcard_protocol::Packet;
use magcard_storage::TrackStore;

/// Behaviour switches distinguishing the cabinet variants.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct ReaderOptions {
    /// Encode the status byte for a unit with a card-slot shutter.
    pub shutter_mode: bool,

    /// Insert a virtual card whenever a poll observes an empty unit.
    ///
    /// Off by default: insertion then only happens through the control
    /// plane. Bench setups without an operator tool turn this on so the
    /// game always finds a card.
    pub auto_insert_on_poll: bool,
}

impl Default for ReaderOptions {
    fn default() -> Self {
        Self {
            shutter_mode: true,
            auto_insert_on_poll: false,
        }
    }
}

/// The emulated reader/dispenser unit.
///
/// Holds the physical state the board can observe plus the three track
/// buffers and the path of the card image backing them. Status codes are
/// reset to "no error" / "no job" at the end of every successfully
/// dispatched command.
pub struct CardReader {
    position: CardPosition,
    dispenser_full: bool,
    cover_closed: bool,
    reader_status: ReaderStatus,
    job_status: JobStatus,
    tracks: TrackSet,
    card_path: PathBuf,
    store: Box<dyn TrackStore>,
    last_command: u8,
    pending: Vec<u8>,
    options: ReaderOptions,
}

impl CardReader {
    /// A powered-on unit: dispenser stocked, cover open, no card, no job.
    pub fn new(store: Box<dyn TrackStore>, card_path: PathBuf, options: ReaderOptions) -> Self {
        Self {
            position: CardPosition::NotInserted,
            dispenser_full: true,
            cover_closed: false,
            reader_status: ReaderStatus::NoError,
            job_status: JobStatus::NoJob,
            tracks: TrackSet::new(),
            card_path,
            store,
            last_command: 0x00,
            pending: Vec::new(),
            options,
        }
    }

    pub fn position(&self) -> CardPosition {
        self.position
    }

    pub fn job_status(&self) -> JobStatus {
        self.job_status
    }

    pub fn reader_status(&self) -> ReaderStatus {
        self.reader_status
    }

    pub fn cover_closed(&self) -> bool {
        self.cover_closed
    }

    pub fn tracks(&self) -> &TrackSet {
        &self.tracks
    }

    pub fn card_path(&self) -> &std::path::Path {
        &self.card_path
    }

    pub fn options(&self) -> ReaderOptions {
        self.options
    }

    /// Returns `true` while any card is held by the unit.
    pub fn card_inserted(&self) -> bool {
        self.position.has_card()
    }

    /// Execute one decoded command packet.
    ///
    /// Returns the command that ran, or `Ok(None)` for an empty payload,
    /// which the unit ignores without acknowledging.
    ///
    /// # Errors
    /// `Error::UnknownCommand` for a command byte outside the set. The
    /// caller must stop the service: the unit has no defined recovery.
    /// Store failures never surface here; they are logged and the command
    /// completes without its data effect.
    pub fn dispatch(&mut self, packet: &Packet) -> Result<Option<Command>> {
        let Some(code) = packet.command_byte() else {
            return Ok(None);
        };

        self.last_command = code;
        let command = Command::from_byte(code)?;
        debug!(%command, len = packet.len(), "dispatching command");

        match command {
            Command::Init | Command::RegisterFont | Command::GetStatus => {
                self.reset_statuses();
            }

            Command::SetShutter => {
                self.cover_closed = packet.param(0) == Some(b'1');
                debug!(closed = self.cover_closed, "shutter moved");
                self.reset_statuses();
            }

            Command::CleanCard => {
                self.cover_closed = false;
                self.position = CardPosition::NotInserted;
                self.reset_statuses();
            }

            Command::EjectCard => {
                self.cover_closed = false;
                self.position = CardPosition::Ejecting;
                self.reset_statuses();
            }

            Command::Read => self.handle_read(packet),

            Command::Write => self.handle_write(packet),

            Command::Erase => {
                self.tracks.erase();
                self.position = CardPosition::UnderReader;
                self.reset_statuses();
                self.persist();
            }

            Command::Print => {
                self.position = CardPosition::UnderPrintHead;
                self.reset_statuses();
            }

            Command::NewCard => {
                self.tracks.erase();
                self.position = CardPosition::DispensingFromBack;
                self.cover_closed = true;
                self.reset_statuses();
                self.persist();
            }

            Command::Cancel | Command::SetPrintParam => {
                self.reset_statuses();
            }
        }

        Ok(Some(command))
    }

    fn handle_read(&mut self, packet: &Packet) {
        if self.position.is_unavailable() {
            warn!(position = %self.position, "read refused, no card available");
            self.job_status = JobStatus::WaitingForCard;
            return;
        }

        // Pick up whatever the operator tooling last wrote to the image.
        match self.store.load(&self.card_path) {
            Ok(tracks) => self.tracks = tracks,
            Err(e) => warn!(error = %e, "card image reload failed, keeping buffered tracks"),
        }

        if packet.param(0) == Some(b'0')
            && let Some(selection) = self.selection_from(packet)
        {
            self.tracks.copy_selected(&selection, &mut self.pending);
            debug!(
                tracks = selection.count(),
                queued = self.pending.len(),
                "track data queued for next poll"
            );
        }

        self.position = CardPosition::UnderReader;
        self.reset_statuses();
    }

    fn handle_write(&mut self, packet: &Packet) {
        if self.position.is_unavailable() {
            warn!(position = %self.position, "write refused, no card available");
            self.job_status = JobStatus::WaitingForCard;
            return;
        }

        if packet.param(0) == Some(b'0')
            && let Some(selection) = self.selection_from(packet)
            && let Err(e) = self.tracks.write_selected(&selection, packet.data())
        {
            warn!(error = %e, "write rejected, tracks untouched");
            self.position = CardPosition::UnderReader;
            self.reader_status = ReaderStatus::NoError;
            self.job_status = JobStatus::IllegalCommand;
            return;
        }

        self.position = CardPosition::UnderReader;
        self.reset_statuses();
        self.persist();
    }

    /// Decode the track selector parameter, logging instead of failing on
    /// anything the table does not cover.
    fn selection_from(&self, packet: &Packet) -> Option<TrackSelection> {
        let Some(selector) = packet.param(2) else {
            warn!("track selector missing from packet");
            return None;
        };
        match TrackSelection::from_selector(selector) {
            Ok(selection) => Some(selection),
            Err(Error::InvalidTrackSelector { code }) => {
                warn!(selector = code, "no such track selection");
                None
            }
            Err(_) => None,
        }
    }

    fn reset_statuses(&mut self) {
        self.reader_status = ReaderStatus::NoError;
        self.job_status = JobStatus::NoJob;
    }

    fn persist(&mut self) {
        if let Err(e) = self.store.save(&self.card_path, &self.tracks) {
            warn!(path = %self.card_path.display(), error = %e, "card image save failed");
        }
    }

    /// The card status byte in the configured encoding.
    ///
    /// Without a shutter the byte is one of the coarse card codes. With a
    /// shutter, bit 7 is set while the cover is closed and bit 6 while
    /// open, bit 5 reports the dispenser, and the low five bits encode the
    /// position. `Ejecting` reads as empty in shutter mode.
    pub fn status_byte(&self) -> u8 {
        if !self.options.shutter_mode {
            let status = match self.position {
                CardPosition::NotInserted => CardStatus::NoCard,
                CardPosition::InsertedInFront
                | CardPosition::UnderPrintHead
                | CardPosition::UnderReader
                | CardPosition::DispensingFromBack => CardStatus::HasCard,
                CardPosition::Ejecting => CardStatus::Ejecting,
            };
            return status.as_byte();
        }

        let mut byte = if self.cover_closed { 1 << 7 } else { 1 << 6 };
        if self.dispenser_full {
            byte |= 1 << 5;
        }
        byte |= match self.position {
            CardPosition::NotInserted => 0b00000,
            CardPosition::InsertedInFront => 0b00001,
            CardPosition::UnderPrintHead => 0b00111,
            CardPosition::UnderReader => 0b11000,
            CardPosition::DispensingFromBack => 0b11100,
            CardPosition::Ejecting => 0b00000,
        };
        byte
    }

    /// Build the reply to a poll and run the transitions the poll implies.
    ///
    /// The reply is `[last command, card status, reader status, job status]`
    /// followed by any queued response data, which is cleared. Once the
    /// board has observed the status, a running job completes and an
    /// ejecting card finishes leaving the unit; with
    /// [`auto_insert_on_poll`](ReaderOptions::auto_insert_on_poll) an empty
    /// unit receives a virtual card instead.
    pub fn poll_reply(&mut self) -> Vec<u8> {
        let mut reply = Vec::with_capacity(4 + self.pending.len());
        reply.push(self.last_command);
        reply.push(self.status_byte());
        reply.push(self.reader_status.as_byte());
        reply.push(self.job_status.as_byte());
        reply.append(&mut self.pending);

        if self.job_status == JobStatus::RunningCommand {
            self.job_status = JobStatus::NoJob;
        }
        if self.options.auto_insert_on_poll && self.position == CardPosition::NotInserted {
            self.position = CardPosition::InsertedInFront;
            info!("virtual card inserted on poll");
        }
        if self.position == CardPosition::Ejecting {
            self.position = CardPosition::NotInserted;
            info!("ejected card taken");
        }

        reply
    }

    /// Control plane: insert the card stored at `path`.
    ///
    /// Loads the image (creating a blank one for a new path) and places the
    /// card in the front slot.
    ///
    /// # Errors
    /// Fails when the image exists but cannot be read, or has the wrong
    /// size. The unit state is untouched on failure.
    pub fn insert_card(&mut self, path: PathBuf) -> Result<()> {
        let tracks = self.store.load(&path)?;
        info!(path = %path.display(), "card inserted");
        self.card_path = path;
        self.tracks = tracks;
        self.position = CardPosition::InsertedInFront;
        Ok(())
    }

    /// Control plane: pull the card straight out of the unit.
    pub fn remove_card(&mut self) {
        info!("card removed");
        self.position = CardPosition::NotInserted;
    }
}

impl std::fmt::Debug for CardReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CardReader")
            .field("position", &self.position)
            .field("cover_closed", &self.cover_closed)
            .field("dispenser_full", &self.dispenser_full)
            .field("reader_status", &self.reader_status)
            .field("job_status", &self.job_status)
            .field("card_path", &self.card_path)
            .field("pending", &self.pending.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use magcard_storage::mock::MemoryTrackStore;
    use rstest::rstest;

    fn reader_with(options: ReaderOptions) -> CardReader {
        CardReader::new(
            Box::new(MemoryTrackStore::new()),
            PathBuf::from("card.bin"),
            options,
        )
    }

    fn command_packet(command: Command) -> Packet {
        Packet::from_payload(vec![command.as_byte(), 0, 0, 0])
    }

    #[rstest]
    #[case(CardPosition::NotInserted, 0x30)]
    #[case(CardPosition::InsertedInFront, 0x31)]
    #[case(CardPosition::UnderPrintHead, 0x31)]
    #[case(CardPosition::UnderReader, 0x31)]
    #[case(CardPosition::DispensingFromBack, 0x31)]
    #[case(CardPosition::Ejecting, 0x34)]
    fn status_byte_without_shutter(#[case] position: CardPosition, #[case] expected: u8) {
        let mut reader = reader_with(ReaderOptions {
            shutter_mode: false,
            ..ReaderOptions::default()
        });
        reader.position = position;
        assert_eq!(reader.status_byte(), expected);
    }

    #[rstest]
    #[case(CardPosition::NotInserted, 0b0000_0000)]
    #[case(CardPosition::InsertedInFront, 0b0000_0001)]
    #[case(CardPosition::UnderPrintHead, 0b0000_0111)]
    #[case(CardPosition::UnderReader, 0b0001_1000)]
    #[case(CardPosition::DispensingFromBack, 0b0001_1100)]
    #[case(CardPosition::Ejecting, 0b0000_0000)]
    fn status_byte_with_shutter(#[case] position: CardPosition, #[case] low_bits: u8) {
        let mut reader = reader_with(ReaderOptions::default());
        reader.position = position;

        // Cover open, dispenser full.
        assert_eq!(reader.status_byte(), (1 << 6) | (1 << 5) | low_bits);

        reader.cover_closed = true;
        assert_eq!(reader.status_byte(), (1 << 7) | (1 << 5) | low_bits);

        reader.dispenser_full = false;
        assert_eq!(reader.status_byte(), (1 << 7) | low_bits);
    }

    #[test]
    fn set_shutter_follows_parameter() {
        let mut reader = reader_with(ReaderOptions::default());

        let close = Packet::from_payload(vec![Command::SetShutter.as_byte(), 0, 0, 0, b'1']);
        reader.dispatch(&close).unwrap();
        assert!(reader.cover_closed());

        let open = Packet::from_payload(vec![Command::SetShutter.as_byte(), 0, 0, 0, b'0']);
        reader.dispatch(&open).unwrap();
        assert!(!reader.cover_closed());
    }

    #[test]
    fn poll_reply_echoes_last_command() {
        let mut reader = reader_with(ReaderOptions::default());
        reader.dispatch(&command_packet(Command::Init)).unwrap();

        let reply = reader.poll_reply();
        assert_eq!(reply[0], Command::Init.as_byte());
        assert_eq!(reply[2], ReaderStatus::NoError.as_byte());
        assert_eq!(reply[3], JobStatus::NoJob.as_byte());
        assert_eq!(reply.len(), 4);
    }

    #[test]
    fn empty_packet_is_ignored() {
        let mut reader = reader_with(ReaderOptions::default());
        let outcome = reader.dispatch(&Packet::from_payload(Vec::new())).unwrap();
        assert!(outcome.is_none());
    }

    #[test]
    fn unknown_command_is_fatal() {
        let mut reader = reader_with(ReaderOptions::default());
        let packet = Packet::from_payload(vec![0x24, 0, 0, 0]);
        assert!(matches!(
            reader.dispatch(&packet),
            Err(Error::UnknownCommand { code: 0x24 })
        ));
    }

    #[test]
    fn eject_then_clean_positions() {
        let mut reader = reader_with(ReaderOptions::default());
        reader.position = CardPosition::UnderReader;

        reader.dispatch(&command_packet(Command::EjectCard)).unwrap();
        assert_eq!(reader.position(), CardPosition::Ejecting);
        assert!(!reader.cover_closed());

        reader.dispatch(&command_packet(Command::CleanCard)).unwrap();
        assert_eq!(reader.position(), CardPosition::NotInserted);
    }

    #[test]
    fn new_card_dispenses_blank_and_closes_cover() {
        let mut reader = reader_with(ReaderOptions::default());
        reader.dispatch(&command_packet(Command::NewCard)).unwrap();

        assert_eq!(reader.position(), CardPosition::DispensingFromBack);
        assert!(reader.cover_closed());
        assert_eq!(reader.tracks(), &TrackSet::new());
    }

    #[test]
    fn auto_insert_waits_for_following_poll_after_eject() {
        let mut reader = reader_with(ReaderOptions {
            auto_insert_on_poll: true,
            ..ReaderOptions::default()
        });
        reader.position = CardPosition::Ejecting;

        // The poll that observes the ejection completes it without
        // re-inserting in the same breath.
        reader.poll_reply();
        assert_eq!(reader.position(), CardPosition::NotInserted);

        reader.poll_reply();
        assert_eq!(reader.position(), CardPosition::InsertedInFront);
    }

    #[test]
    fn poll_clears_running_job() {
        let mut reader = reader_with(ReaderOptions::default());
        reader.job_status = JobStatus::RunningCommand;

        let reply = reader.poll_reply();
        assert_eq!(reply[3], JobStatus::RunningCommand.as_byte());
        assert_eq!(reader.job_status(), JobStatus::NoJob);
    }
}
