// Copyright 2018 Ian Johnson

// This file is part of Chip-8.

// Chip-8 is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.

// Chip-8 is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.

// You should have received a copy of the GNU General Public License
// along with Chip-8.  If not, see <http://www.gnu.org/licenses/>.

//! The `chip8` binary program.
//!
//! The interpreter runs on its own thread at a fixed rate; this thread owns
//! SDL and handles the window, the keyboard and the buzzer.

extern crate chip8vm;
extern crate clap;
extern crate env_logger;
#[macro_use]
extern crate failure;
#[macro_use]
extern crate log;
#[macro_use]
extern crate maplit;
extern crate sdl2;

use std::collections::HashMap;
use std::fs::File;
use std::io::Write;
use std::process;
use std::str::FromStr;
use std::sync::mpsc::{self, TryRecvError};
use std::thread;
use std::time::Duration;

use clap::{App, ArgMatches};
use failure::{Error, Fail, ResultExt};
use log::LevelFilter;
use sdl2::audio::{AudioCallback, AudioSpecDesired};
use sdl2::event::Event;
use sdl2::keyboard::Keycode;
use sdl2::pixels::Color;
use sdl2::rect::Rect;
use sdl2::render::Canvas;
use sdl2::video::Window;

use chip8vm::display::{self, Buffer, SharedDisplay};
use chip8vm::input::{Key, Keypad};
use chip8vm::sound::ToneGate;
use chip8vm::{Interpreter, Options, Scheduler, SystemClock};

const VERSION: &str = env!("CARGO_PKG_VERSION");

/// How long the UI thread waits between frames, in milliseconds.
const FRAME_MILLIS: u64 = 16;

/// The sample rate requested from the audio device.
const SAMPLE_RATE: i32 = 44_100;

/// An SDL error.
#[derive(Debug, Fail)]
#[fail(display = "SDL error: {}", _0)]
struct SdlError(String);

/// The window the shared display buffer is painted to.
struct Screen {
    canvas: Canvas<Window>,
    /// The size of one Chip-8 pixel, in window pixels.
    scale: u32,
    bg: Color,
    fg: Color,
}

impl Screen {
    fn new(video: &sdl2::VideoSubsystem, scale: u32) -> Result<Self, Error> {
        let window = video
            .window(
                "Chip-8",
                display::WIDTH as u32 * scale,
                display::HEIGHT as u32 * scale,
            )
            .build()?;
        let mut screen = Screen {
            canvas: window.into_canvas().build()?,
            scale,
            bg: Color::RGB(0, 0, 0),
            fg: Color::RGB(255, 255, 255),
        };
        screen.paint(&Buffer::new())?;
        Ok(screen)
    }

    /// Paints every set pixel of `buffer` as one filled square.
    fn paint(&mut self, buffer: &Buffer) -> Result<(), SdlError> {
        let scale = self.scale;
        let lit: Vec<Rect> = buffer
            .data()
            .iter()
            .enumerate()
            .flat_map(|(y, row)| {
                row.iter()
                    .enumerate()
                    .filter(|&(_, &on)| on)
                    .map(move |(x, _)| {
                        Rect::new((x as u32 * scale) as i32, (y as u32 * scale) as i32, scale, scale)
                    })
            })
            .collect();

        self.canvas.set_draw_color(self.bg);
        self.canvas.clear();
        if !lit.is_empty() {
            self.canvas.set_draw_color(self.fg);
            self.canvas.fill_rects(&lit).map_err(SdlError)?;
        }
        self.canvas.present();
        Ok(())
    }
}

/// The conventional mapping of the hex keypad onto the left side of a QWERTY
/// keyboard.
fn default_keymap() -> HashMap<Keycode, Key> {
    hashmap![
        Keycode::Num1 => Key::K1,
        Keycode::Num2 => Key::K2,
        Keycode::Num3 => Key::K3,
        Keycode::Num4 => Key::KC,
        Keycode::Q => Key::K4,
        Keycode::W => Key::K5,
        Keycode::E => Key::K6,
        Keycode::R => Key::KD,
        Keycode::A => Key::K7,
        Keycode::S => Key::K8,
        Keycode::D => Key::K9,
        Keycode::F => Key::KE,
        Keycode::Z => Key::KA,
        Keycode::X => Key::K0,
        Keycode::C => Key::KB,
        Keycode::V => Key::KF,
    ]
}

/// Square-wave generator for the buzzer.
struct Buzzer {
    amplitude: f32,
    /// Position within the current wave, in `[0, 1)`.
    phase: f32,
    /// How far `phase` moves per sample.
    step: f32,
}

impl AudioCallback for Buzzer {
    type Channel = f32;

    fn callback(&mut self, out: &mut [f32]) {
        for sample in out.iter_mut() {
            *sample = if self.phase < 0.5 {
                self.amplitude
            } else {
                -self.amplitude
            };
            self.phase = (self.phase + self.step).fract();
        }
    }
}

fn main() {
    let matches = App::new("chip8")
        .version(VERSION)
        .about("A Chip-8 interpreter")
        .args_from_usage(
            "-f, --frequency=[FREQ]     'set instruction rate (in Hz)'
             --timer-frequency=[FREQ]   'set delay and sound timer rate (in Hz)'
             -s, --scale=[SCALE]        'set display scale'
             -t, --tone=[FREQ]          'set buzzer tone (in Hz)'
             --volume=[VOL]             'set buzzer volume (0-100)'
             -v...                      'increase verbosity'
             <FILE>                     'the program file to run'",
        )
        .get_matches();

    let filter = match matches.occurrences_of("v") {
        0 => LevelFilter::Warn,
        1 => LevelFilter::Info,
        2 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    };
    env_logger::Builder::new()
        .filter(None, filter)
        .format(|buf, record| writeln!(buf, "{}: {}", record.level(), record.args()))
        .init();

    if let Err(e) = run(&matches) {
        error!("{}", e);
        for cause in e.causes().skip(1) {
            info!("caused by: {}", cause);
        }
        trace!("backtrace: {}", e.backtrace());
        process::exit(1);
    }
}

/// Parses the value of the named argument, or returns `default` if it was not
/// given.
fn parse_arg<T>(matches: &ArgMatches, name: &str, default: T) -> Result<T, Error>
where
    T: FromStr,
    T::Err: Fail,
{
    match matches.value_of(name) {
        Some(value) => Ok(value
            .parse()
            .with_context(|_| format!("invalid {} argument '{}'", name, value))?),
        None => Ok(default),
    }
}

/// Processes the command-line arguments into interpreter options.
fn process_opts(matches: &ArgMatches) -> Result<Options, Error> {
    let defaults = Options::new();
    let opts = Options {
        cpu_freq: parse_arg(matches, "frequency", defaults.cpu_freq)?,
        timer_freq: parse_arg(matches, "timer-frequency", defaults.timer_freq)?,
        ..defaults
    };
    if opts.cpu_freq == 0 || opts.timer_freq == 0 {
        bail!("frequencies must be positive");
    }
    Ok(opts)
}

fn run(matches: &ArgMatches) -> Result<(), Error> {
    let options = process_opts(matches)?;
    let scale: u32 = parse_arg(matches, "scale", 10)?;
    let tone: u32 = parse_arg(matches, "tone", 440)?;
    let volume: u32 = parse_arg(matches, "volume", 10)?;

    let filename = matches
        .value_of("FILE")
        .ok_or_else(|| format_err!("no program file given"))?;
    let mut input =
        File::open(filename).with_context(|_| format!("could not open file '{}'", filename))?;

    let shared_display = SharedDisplay::new();
    let keypad = Keypad::new();
    let gate = ToneGate::new();
    let mut interpreter =
        Interpreter::with_options(&options, shared_display.clone(), keypad.clone(), gate.clone());
    interpreter
        .load_program(&mut input)
        .with_context(|_| format!("could not load program from file '{}'", filename))?;

    let sdl = sdl2::init()
        .map_err(SdlError)
        .context("could not initialize SDL")?;
    let video = sdl.video()
        .map_err(SdlError)
        .context("could not initialize SDL video")?;
    let audio = sdl.audio()
        .map_err(SdlError)
        .context("could not initialize SDL audio")?;
    let mut events = sdl.event_pump()
        .map_err(SdlError)
        .context("could not initialize SDL event loop")?;
    let mut screen = Screen::new(&video, scale)?;
    let buzzer = audio
        .open_playback(
            None,
            &AudioSpecDesired {
                freq: Some(SAMPLE_RATE),
                channels: Some(1),
                samples: None,
            },
            |spec| Buzzer {
                amplitude: volume.min(100) as f32 / 100.0,
                phase: 0.0,
                step: tone as f32 / spec.freq as f32,
            },
        )
        .map_err(SdlError)
        .context("could not open audio playback")?;
    let keymap = default_keymap();

    // The interpreter thread has no way to be cancelled (it may be blocked
    // waiting for a key), so it is simply abandoned when the window closes.
    let (errors, failed) = mpsc::channel();
    thread::Builder::new()
        .name("interpreter".to_owned())
        .spawn(move || {
            let mut scheduler = Scheduler::new(interpreter, SystemClock, &options);
            if let Err(e) = scheduler.run() {
                let _ = errors.send(e);
            }
        })
        .context("could not start interpreter thread")?;

    'main: loop {
        for event in events.poll_iter() {
            match event {
                Event::Quit { .. } => break 'main,
                Event::Window { .. } => shared_display.lock().force_refresh(),
                Event::KeyDown {
                    keycode: Some(code),
                    ..
                } => if let Some(&key) = keymap.get(&code) {
                    keypad.press(key);
                },
                Event::KeyUp {
                    keycode: Some(code),
                    ..
                } => if let Some(&key) = keymap.get(&code) {
                    keypad.release(key);
                },
                _ => {}
            }
        }

        shared_display
            .lock()
            .refresh(|buf| screen.paint(buf))
            .context("could not refresh display window")?;
        if gate.sounding() {
            buzzer.resume();
        } else {
            buzzer.pause();
        }

        match failed.try_recv() {
            // The interpreter already attached context to its errors.
            Ok(e) => return Err(e),
            Err(TryRecvError::Empty) => {}
            Err(TryRecvError::Disconnected) => {
                info!("interpreter stopped");
                break;
            }
        }
        thread::sleep(Duration::from_millis(FRAME_MILLIS));
    }

    Ok(())
}
