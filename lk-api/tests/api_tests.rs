//! Property checks for the shared types and test doubles

use lk_api::testing::{FlatMemory, MemFs};
use lk_api::{AbiContext, AbiFlags, AbiTag, FileSystem, OpenMode, UserMemory, MAX_ABI};
use proptest::prelude::*;

fn any_tag() -> impl Strategy<Value = AbiTag> {
    prop::sample::select(AbiTag::ALL.to_vec())
}

proptest! {
    #[test]
    fn prop_from_raw_accepts_exactly_known_tags(raw in any::<u32>()) {
        match AbiTag::from_raw(raw) {
            Some(tag) => {
                prop_assert!((raw as usize) < MAX_ABI);
                prop_assert_eq!(tag as u32, raw);
            }
            None => prop_assert!(raw as usize >= MAX_ABI),
        }
    }

    #[test]
    fn prop_retag_hands_back_old_state(from in any_tag(), to in any_tag(), value in any::<u64>()) {
        let mut ctx = AbiContext::new(from);
        ctx.flags = AbiFlags::TRACE;
        ctx.private.set(value);

        match ctx.retag(to) {
            Some((old, mut blob)) => {
                prop_assert_ne!(from, to);
                prop_assert_eq!(old, from);
                prop_assert_eq!(blob.get_mut::<u64>().copied(), Some(value));
                prop_assert!(ctx.private.is_empty());
                prop_assert!(ctx.flags.is_empty());
            }
            None => {
                prop_assert_eq!(from, to);
                prop_assert_eq!(ctx.private.get::<u64>().copied(), Some(value));
                prop_assert_eq!(ctx.flags, AbiFlags::TRACE);
            }
        }
        prop_assert_eq!(ctx.tag, to);
    }

    #[test]
    fn prop_memfs_reads_back_what_was_written(
        chunks in prop::collection::vec(prop::collection::vec(any::<u8>(), 0..64), 0..8),
    ) {
        let fs = MemFs::new().with_dirs(&["/d"]);
        let h = fs.open("/d/f", OpenMode::WRITE | OpenMode::CREATE).unwrap();
        for chunk in &chunks {
            prop_assert_eq!(fs.write(h, chunk).unwrap(), chunk.len());
        }
        fs.close(h).unwrap();
        prop_assert_eq!(fs.contents("/d/f").unwrap(), chunks.concat());
    }

    #[test]
    fn prop_user_memory_is_bounds_checked(addr in any::<u32>(), len in 0usize..64) {
        let mem = FlatMemory::new(256);
        let mut buf = vec![0u8; len];
        let fits = (addr as usize).checked_add(len).is_some_and(|end| end <= 256);
        prop_assert_eq!(mem.read(addr, &mut buf).is_ok(), fits);
    }
}
