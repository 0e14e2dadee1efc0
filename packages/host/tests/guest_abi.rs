//! Drive the import handlers the way a guest would, against a plain byte
//! vector standing in for linear memory.

use collection_literals::btree;
use nux_host::abi::{StatRecord, FAILURE, READ_ERROR, SUCCESS};
use nux_host::command::{opcode, CommandRecord, DEFAULT_FRAMEBUFFER};
use nux_host::gpu::{PipelineInfo, TextureInfo};
use nux_host::input::{Buttons, InputSnapshot};
use nux_host::{
    imports, FixedStep, Fault, FrameHost, FrameScheduler, FrameTime, GuestMemory, HeadlessBackend,
    HostConfig, ScriptedInput, Session, StopReason,
};

const MEMORY_SIZE: usize = 4096;
const SCRATCH: i32 = 1024;

struct Guest {
    session: Session,
    memory: Vec<u8>,
    backend: HeadlessBackend,
}

impl Guest {
    fn new(config: HostConfig) -> Self {
        let backend = HeadlessBackend::new();
        let session = Session::new(config, Box::new(backend.clone()));
        Self {
            session,
            memory: vec![0; MEMORY_SIZE],
            backend,
        }
    }

    fn with_files(files: std::collections::BTreeMap<&str, Vec<u8>>) -> Self {
        let mut guest = Self::new(HostConfig::default());
        for (name, data) in files {
            guest.session.vfs.insert(name, data);
        }
        guest
    }

    fn poke(&mut self, ptr: i32, bytes: &[u8]) -> i32 {
        let start = ptr as usize;
        self.memory[start..start + bytes.len()].copy_from_slice(bytes);
        bytes.len() as i32
    }

    fn peek(&self, ptr: i32, len: usize) -> &[u8] {
        &self.memory[ptr as usize..ptr as usize + len]
    }

    fn open(&mut self, slot: i32, path: &str) -> i32 {
        let len = self.poke(0, path.as_bytes());
        let memory = GuestMemory::new(&mut self.memory);
        imports::file_open(&mut self.session, &memory, 0, slot, 0, len, 0).unwrap()
    }

    fn stat(&mut self, slot: i32) -> Option<i32> {
        let mut memory = GuestMemory::new(&mut self.memory);
        match imports::file_stat(&mut self.session, &mut memory, 0, slot, 512).unwrap() {
            SUCCESS => Some(memory.read_pod::<StatRecord>("test", 512).unwrap().size),
            _ => None,
        }
    }

    fn read(&mut self, slot: i32, n: i32) -> i32 {
        let mut memory = GuestMemory::new(&mut self.memory);
        imports::file_read(&mut self.session, &mut memory, 0, slot, SCRATCH, n).unwrap()
    }

    fn submit(&mut self, records: &[CommandRecord]) -> Result<i32, Fault> {
        self.poke(SCRATCH, bytemuck::cast_slice(records));
        let memory = GuestMemory::new(&mut self.memory);
        imports::gpu_submit(&mut self.session, &memory, 0, SCRATCH, records.len() as i32)
    }
}

fn files() -> std::collections::BTreeMap<&'static str, Vec<u8>> {
    btree! {
        "cart.bin" => (0u8..=255).collect::<Vec<u8>>(),
        "empty" => Vec::new(),
        "levels/one.map" => b"##..##".to_vec(),
    }
}

#[test]
fn every_registered_file_opens_with_its_size() {
    let mut guest = Guest::with_files(files());
    for (slot, (name, data)) in files().into_iter().enumerate() {
        let slot = slot as i32;
        assert_eq!(guest.open(slot, name), SUCCESS, "{}", name);
        assert_eq!(guest.stat(slot), Some(data.len() as i32), "{}", name);
    }
}

#[test]
fn unregistered_paths_allocate_nothing() {
    let mut guest = Guest::with_files(files());
    for name in ["missing", "cart.bin ", "levels", "/cart.bin"] {
        assert_eq!(guest.open(0, name), FAILURE, "{}", name);
    }
    assert_eq!(guest.session.vfs.open_count(), 0);
}

#[test]
fn seek_then_read_returns_the_right_window() {
    let data = b"0123456789abcdef".to_vec();
    let mut guest = Guest::with_files(btree! { "data" => data.clone() });
    assert_eq!(guest.open(0, "data"), SUCCESS);

    for k in 0..=data.len() {
        for n in [0, 1, 5, 16, 32] {
            assert_eq!(
                imports::file_seek(&mut guest.session, 0, 0, k as i32),
                Ok(SUCCESS)
            );
            let expected = n.min(data.len() - k);
            assert_eq!(guest.read(0, n as i32), expected as i32, "k={} n={}", k, n);
            assert_eq!(guest.peek(SCRATCH, expected), &data[k..k + expected]);
            let handle = guest.session.vfs.handle(nux_host::Slot::new(0)).unwrap();
            assert_eq!(handle.cursor(), k + expected);
        }
    }

    assert_eq!(imports::file_seek(&mut guest.session, 0, 0, 16), Ok(SUCCESS));
    assert_eq!(guest.read(0, 8), 0);
    assert_eq!(guest.read(0, 8), 0);
}

#[test]
fn dead_slots_are_invalid_for_every_operation() {
    let mut guest = Guest::with_files(files());
    let capacity = guest.session.config().slot_capacity as i32;

    // Slot 5 existed once; everything else never did.
    assert_eq!(guest.open(5, "cart.bin"), SUCCESS);
    imports::file_close(&mut guest.session, 0, 5);

    for slot in -1..=capacity {
        assert_eq!(guest.stat(slot), None, "stat {}", slot);
        assert_eq!(guest.read(slot, 4), READ_ERROR, "read {}", slot);
        assert_eq!(
            imports::file_seek(&mut guest.session, 0, slot, 0),
            Ok(FAILURE)
        );
        for delete in [
            imports::pipeline_delete,
            imports::framebuffer_delete,
            imports::texture_delete,
            imports::buffer_delete,
        ] {
            assert_eq!(delete(&mut guest.session, 0, slot), Ok(FAILURE), "slot {}", slot);
        }
        assert_eq!(
            imports::framebuffer_create(&mut guest.session, 0, 0, slot),
            Ok(FAILURE),
            "framebuffer over texture {}",
            slot
        );

        let raw = slot as u32;
        let mut records = vec![
            CommandRecord::new(opcode::BIND_PIPELINE, &[raw]),
            CommandRecord::new(opcode::BIND_BUFFER, &[0, raw]),
            CommandRecord::new(opcode::BIND_TEXTURE, &[0, raw]),
        ];
        // -1 is the screen when binding framebuffers.
        if raw != DEFAULT_FRAMEBUFFER {
            records.push(CommandRecord::new(opcode::BIND_FRAMEBUFFER, &[raw]));
        }
        for record in records {
            assert_eq!(guest.submit(&[record]), Ok(FAILURE), "{:?}", record);
        }

        let memory = GuestMemory::new(&mut guest.memory);
        assert_eq!(
            imports::texture_update(&mut guest.session, &memory, 0, slot, 0, 0, 1, 1, 0),
            Ok(FAILURE)
        );
        assert_eq!(
            imports::buffer_update(&mut guest.session, &memory, 0, slot, 0, 1, 0),
            Ok(FAILURE)
        );
    }
}

type Import = fn(&mut Session, &mut GuestMemory<'_>) -> Result<i32, Fault>;

#[test]
fn guest_ranges_past_memory_are_fatal_for_every_import() {
    // Starts 4 bytes before the end, so any access longer than that faults.
    const END: i32 = MEMORY_SIZE as i32 - 4;

    let mut guest = Guest::with_files(files());
    assert_eq!(guest.open(0, "cart.bin"), SUCCESS);
    let info = TextureInfo {
        format: 0,
        filter: 0,
        width: 4,
        height: 4,
    };
    guest.poke(0, bytemuck::bytes_of(&info));
    let memory = GuestMemory::new(&mut guest.memory);
    assert_eq!(
        imports::texture_create(&mut guest.session, &memory, 0, 0, 0),
        Ok(SUCCESS)
    );
    assert_eq!(
        imports::buffer_create(&mut guest.session, 0, 0, 1, 64),
        Ok(SUCCESS)
    );

    let cases: [(&str, Import); 12] = [
        ("file_open path", |s, m| imports::file_open(s, m, 0, 1, END, 9, 0)),
        ("file_stat record", |s, m| imports::file_stat(s, m, 0, 0, END)),
        ("file_read destination", |s, m| imports::file_read(s, m, 0, 0, END, 8)),
        ("file_write source", |s, m| imports::file_write(s, m, 0, 0, END, 8)),
        ("pipeline_create info", |s, m| imports::pipeline_create(s, m, 0, 1, END)),
        ("texture_create info", |s, m| imports::texture_create(s, m, 0, 1, END)),
        ("texture_update pixels", |s, m| {
            imports::texture_update(s, m, 0, 0, 0, 0, 4, 4, END)
        }),
        ("buffer_update data", |s, m| imports::buffer_update(s, m, 0, 0, 0, 16, END)),
        ("gpu_submit records", |s, m| imports::gpu_submit(s, m, 0, END, 2)),
        ("runtime_log message", |s, m| {
            imports::runtime_log(s, m, 1, END, 16).map(|_| SUCCESS)
        }),
        ("input_update buttons", |s, m| imports::input_update(s, m, 0, END, 0)),
        ("input_update axes", |s, m| imports::input_update(s, m, 0, 0, END)),
    ];

    let objects = guest.backend.inspect(|s| s.objects.clone());
    for (name, call) in cases {
        let before = guest.memory.clone();
        let mut memory = GuestMemory::new(&mut guest.memory);
        assert!(
            matches!(
                call(&mut guest.session, &mut memory),
                Err(Fault::MemoryOutOfBounds { .. })
            ),
            "{}",
            name
        );

        assert_eq!(guest.memory, before, "{} wrote guest memory", name);
        assert_eq!(guest.session.vfs.open_count(), 1, "{}", name);
        let cart = guest.session.vfs.handle(nux_host::Slot::new(0)).unwrap();
        assert_eq!(cart.cursor(), 0, "{}", name);
        assert!(guest.session.input.target().is_none(), "{}", name);
        guest.backend.inspect(|s| {
            assert_eq!(s.objects, objects, "{}", name);
            assert!(s.batches.is_empty(), "{}", name);
        });
    }
}

#[test]
fn batch_with_one_bad_handle_changes_nothing() {
    let mut guest = Guest::new(HostConfig::default());
    let info = PipelineInfo::default();
    guest.poke(0, bytemuck::bytes_of(&info));
    let memory = GuestMemory::new(&mut guest.memory);
    assert_eq!(
        imports::pipeline_create(&mut guest.session, &memory, 0, 0, 0),
        Ok(SUCCESS)
    );

    let before = guest.backend.inspect(|s| s.objects.clone());
    let records = [
        CommandRecord::new(opcode::BIND_FRAMEBUFFER, &[DEFAULT_FRAMEBUFFER]),
        CommandRecord::new(opcode::BIND_PIPELINE, &[0]),
        CommandRecord::new(opcode::BIND_BUFFER, &[0, 7]),
        CommandRecord::new(opcode::DRAW, &[0, 3]),
    ];
    assert_eq!(guest.submit(&records), Ok(FAILURE));
    guest.backend.inspect(|s| {
        assert!(s.batches.is_empty());
        assert_eq!(s.objects, before);
    });

    assert_eq!(guest.submit(&[records[0], records[1], records[3]]), Ok(SUCCESS));
    guest.backend.inspect(|s| assert_eq!(s.command_count(), 3));
}

#[test]
fn read_past_end_of_memory_is_fatal() {
    let mut guest = Guest::with_files(files());
    assert_eq!(guest.open(0, "cart.bin"), SUCCESS);
    let mut memory = GuestMemory::new(&mut guest.memory);
    let result = imports::file_read(
        &mut guest.session,
        &mut memory,
        0,
        0,
        MEMORY_SIZE as i32 - 8,
        64,
    );
    assert!(matches!(result, Err(Fault::MemoryOutOfBounds { .. })));
}

#[test]
fn framebuffer_renders_into_texture() {
    let mut guest = Guest::new(HostConfig::default());
    let info = TextureInfo {
        format: 0,
        filter: 1,
        width: 16,
        height: 16,
    };
    guest.poke(0, bytemuck::bytes_of(&info));
    let memory = GuestMemory::new(&mut guest.memory);
    assert_eq!(
        imports::texture_create(&mut guest.session, &memory, 0, 1, 0),
        Ok(SUCCESS)
    );
    assert_eq!(
        imports::framebuffer_create(&mut guest.session, 0, 0, 1),
        Ok(SUCCESS)
    );
    // The texture slot must exist.
    assert_eq!(
        imports::framebuffer_create(&mut guest.session, 0, 1, 9),
        Ok(FAILURE)
    );

    let records = [
        CommandRecord::new(opcode::BIND_FRAMEBUFFER, &[0]),
        CommandRecord::new(opcode::VIEWPORT, &[0, 0, 16, 16]),
        CommandRecord::new(opcode::CLEAR, &[0x0000_00ff]),
    ];
    assert_eq!(guest.submit(&records), Ok(SUCCESS));

    assert_eq!(imports::texture_delete(&mut guest.session, 0, 1), Ok(SUCCESS));
    assert_eq!(guest.submit(&records), Ok(FAILURE));
    guest.backend.inspect(|s| assert_eq!(s.batches.len(), 1));
}

/// A guest whose update reads input and submits one clear per frame.
struct Clearer {
    guest: Guest,
    buttons_seen: Vec<u32>,
}

const BUTTONS_PTR: i32 = 256;
const AXES_PTR: i32 = 272;

impl FrameHost for Clearer {
    type Error = Fault;

    fn init(&mut self) -> Result<(), Fault> {
        self.guest.session.start()?;
        let mut memory = GuestMemory::new(&mut self.guest.memory);
        imports::input_update(&mut self.guest.session, &mut memory, 0, BUTTONS_PTR, AXES_PTR)?;
        Ok(())
    }

    fn refresh_input(&mut self, _time: &FrameTime) {
        let mut memory = GuestMemory::new(&mut self.guest.memory);
        self.guest.session.input.refresh(&mut memory);
    }

    fn update(&mut self, _time: &FrameTime) -> Result<(), Fault> {
        let buttons = self.guest.peek(BUTTONS_PTR, 4);
        self.buttons_seen
            .push(u32::from_le_bytes([buttons[0], buttons[1], buttons[2], buttons[3]]));
        self.guest
            .submit(&[CommandRecord::new(opcode::CLEAR, &[0])])
            .map(|_| ())
    }
}

#[test]
fn scheduler_drives_a_guest() {
    let mut pressed = InputSnapshot::neutral();
    pressed.players[0].buttons = Buttons::A | Buttons::LB;
    let mut guest = Guest::new(HostConfig::default());
    guest.session.input = nux_host::InputBridge::new(Box::new(ScriptedInput::new([
        InputSnapshot::neutral(),
        pressed,
    ])));
    let backend = guest.backend.clone();

    let mut scheduler = FrameScheduler::new(Clearer {
        guest,
        buttons_seen: Vec::new(),
    });
    let reason = scheduler.run(&mut FixedStep::new(16.0).limit(4)).cloned();
    assert_eq!(reason, Some(StopReason::Exhausted));
    assert_eq!(
        scheduler.host().buttons_seen,
        vec![0, (Buttons::A | Buttons::LB).bits(), 0]
    );
    backend.inspect(|s| {
        assert_eq!(s.screen_clears.len(), 1);
        assert_eq!(s.batches.len(), 3);
    });
}
