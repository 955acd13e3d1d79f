//! Song-element encoding into the piezo tune string PX4 plays.
//!
//! The dialect is the string format of the PLAY_TUNE message: `T<n>` tempo,
//! `L<n>` note length, `>`/`<` octave shifts, note letters with `+`/`-`
//! accidentals and `P` for a pause.

use kestrel_vehicle::{SongElement, TuneDescription};

pub fn encode(tune: &TuneDescription) -> String {
    let mut out = format!("MFT{}", tune.tempo);
    for element in &tune.elements {
        out.push_str(match element {
            SongElement::Duration1 => "L1",
            SongElement::Duration2 => "L2",
            SongElement::Duration4 => "L4",
            SongElement::Duration8 => "L8",
            SongElement::NoteA => "A",
            SongElement::NoteB => "B",
            SongElement::NoteC => "C",
            SongElement::NoteD => "D",
            SongElement::NoteE => "E",
            SongElement::NoteF => "F",
            SongElement::NoteG => "G",
            SongElement::NotePause => "P",
            SongElement::Sharp => "+",
            SongElement::Flat => "-",
            SongElement::OctaveUp => ">",
            SongElement::OctaveDown => "<",
        });
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use SongElement::*;

    #[test]
    fn tempo_prefix_and_elements() {
        let tune = TuneDescription {
            elements: vec![Duration4, NoteG, NoteA, NoteB, Flat, OctaveUp, Duration1, NoteE],
            tempo: 200,
        };
        assert_eq!(encode(&tune), "MFT200L4GAB->L1E");
    }

    #[test]
    fn empty_tune_is_just_the_tempo() {
        let tune = TuneDescription { elements: vec![], tempo: 120 };
        assert_eq!(encode(&tune), "MFT120");
    }

    #[test]
    fn pause_and_octave_down() {
        let tune = TuneDescription {
            elements: vec![NotePause, OctaveDown, NoteC, Sharp],
            tempo: 90,
        };
        assert_eq!(encode(&tune), "MFT90P<C+");
    }
}
