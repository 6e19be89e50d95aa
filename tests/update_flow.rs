// Copyright 2022-2023 Google LLC
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//      http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use std::sync::Mutex;
use suit_storage::api::component::ComponentId;
use suit_storage::env::host::mtd::{FileMtd, FileMtdOptions};
use suit_storage::env::host::vfs::HostFileSystem;
use suit_storage::env::host::HostEnv;
use suit_storage::env::test::mtd::{BufferMtd, BufferMtdOptions};
use suit_storage::env::test::vfs::MemFileSystem;
use suit_storage::env::test::TestEnv;
use suit_storage::{
    DynStorage, Hook, HookStage, InstallInfo, MtdRegion, MtdStorage, Registry, Storage,
    StorageError, StorageResult, VfsStorage,
};
use tempfile::TempDir;

const FILES: &[&str] = &["/nvm0/fw0.bin", "/nvm0/fw1.bin"];

const MTD_OPTIONS: BufferMtdOptions = BufferMtdOptions {
    page_size: 128,
    pages_per_sector: 4,
    sector_count: 8,
    strict_mode: true,
};

fn image(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i * 7 % 256) as u8).collect()
}

/// Drives one update the way a manifest engine does.
fn update(
    registry: &mut Registry,
    component: &ComponentId,
    seq_no: u32,
    payload: &[u8],
) -> StorageResult<()> {
    registry.check_seq_no(seq_no)?;
    let storage = registry
        .find_by_component(component)
        .ok_or(StorageError::LocationNotFound)?;
    let mut location = String::new();
    for part in component.parts() {
        location.push(storage.separator());
        location.push_str(std::str::from_utf8(part).unwrap());
    }
    storage.set_active_location(&location)?;
    storage.start(payload.len())?;
    for (index, chunk) in payload.chunks(100).enumerate() {
        storage.write(chunk, index * 100)?;
    }
    storage.finish()?;
    let result = storage.commit(seq_no);
    if result.is_err() {
        storage.erase()?;
    }
    result
}

#[test]
fn update_through_registry() {
    let events = Mutex::new(Vec::new());
    let record = |info: &InstallInfo| -> StorageResult<()> {
        events.lock().unwrap().push((info.stage, info.seq_no));
        Ok(())
    };
    let pre = Hook::new(&record);
    let post = Hook::new(&record);
    let veto_calls = Mutex::new(0);
    let veto = |_: &InstallInfo| -> StorageResult<()> {
        *veto_calls.lock().unwrap() += 1;
        Err(StorageError::StorageFault)
    };
    let veto = Hook::new(&veto);

    let mut regions = [
        MtdRegion::new(BufferMtd::new_erased(MTD_OPTIONS)),
        MtdRegion::new(BufferMtd::new_erased(MTD_OPTIONS)),
    ];
    let fs = MemFileSystem::with_dir("/nvm0");
    let mut mtd = Storage::new(MtdStorage::new(TestEnv::default(), &mut regions));
    let mut vfs = Storage::new(VfsStorage::new(TestEnv::default(), fs.clone(), FILES));
    mtd.add_pre_hook(&pre).unwrap();
    mtd.add_post_hook(&post).unwrap();
    {
        let mut storages: [&mut DynStorage; 2] = [&mut mtd, &mut vfs];
        let mut registry = Registry::new(&mut storages);
        assert!(registry.init_all().is_ok());
        // Nothing stored yet: the file system backend has no sequence number file.
        assert_eq!(registry.get_highest_seq_no(), Ok(0));

        let flash = ComponentId::new(&[b"mtd", b"1"]);
        let payload = image(1000);
        assert_eq!(update(&mut registry, &flash, 3, &payload), Ok(()));
        let mut read_back = vec![0; payload.len()];
        let storage = registry.find_by_id(".mtd.1").unwrap();
        storage.read(&mut read_back, 0).unwrap();
        assert_eq!(read_back, payload);
        assert_eq!(registry.get_highest_seq_no(), Ok(3));

        let file = ComponentId::new(&[b"nvm0", b"fw1.bin"]);
        assert_eq!(
            update(&mut registry, &file, 3, b"rollback"),
            Err(StorageError::SequenceRollback)
        );
        assert_eq!(update(&mut registry, &file, 4, b"newer image"), Ok(()));
        assert_eq!(registry.get_highest_seq_no(), Ok(4));
        assert!(registry.set_seq_no_all(4).failed(1));
        assert!(registry.iter().all(|storage| storage.get_seq_no() == Ok(4)));

        let unknown = ComponentId::new(&[b"mtd", b"2"]);
        assert_eq!(
            update(&mut registry, &unknown, 5, b"x"),
            Err(StorageError::LocationNotFound)
        );
    }
    assert_eq!(fs.contents("/nvm0/fw1.bin"), Some(b"newer image".to_vec()));
    assert_eq!(fs.contents("/nvm0/SEQNO.txt"), Some(b"4\n".to_vec()));
    assert_eq!(
        *events.lock().unwrap(),
        vec![(HookStage::PreInstall, 3), (HookStage::PostInstall, 3)]
    );

    // A vetoing pre-install hook aborts the update and the partial image is erased.
    mtd.add_pre_hook(&veto).unwrap();
    {
        let mut storages: [&mut DynStorage; 2] = [&mut mtd, &mut vfs];
        let mut registry = Registry::new(&mut storages);
        let flash = ComponentId::new(&[b"mtd", b"0"]);
        assert_eq!(
            update(&mut registry, &flash, 9, &image(600)),
            Err(StorageError::StorageFault)
        );
        assert_eq!(registry.get_highest_seq_no(), Ok(4));
    }
    assert_eq!(*veto_calls.lock().unwrap(), 1);
    drop(mtd);
    let dev = regions[0].device().unwrap();
    assert_eq!(dev.erase_log(), &[(0, 2)]);
    assert!(dev.contents().iter().all(|&byte| byte == 0xff));
}

#[test]
fn host_backends_persist_across_restart() {
    let tmp_dir = TempDir::new().unwrap();
    let flash_path = tmp_dir.path().join("flash.bin");
    let options = FileMtdOptions {
        page_size: 256,
        pages_per_sector: 4,
        sector_count: 4,
    };
    let fs = HostFileSystem::new(tmp_dir.path());
    fs.create_dir("/nvm0").unwrap();
    let payload = image(3000);
    {
        let mut regions = [MtdRegion::new(FileMtd::new(&flash_path, options).unwrap())];
        let mut mtd = Storage::new(MtdStorage::new(HostEnv::new(), &mut regions));
        let mut vfs = Storage::new(VfsStorage::new(
            HostEnv::new(),
            HostFileSystem::new(tmp_dir.path()),
            FILES,
        ));
        let mut storages: [&mut DynStorage; 2] = [&mut mtd, &mut vfs];
        let mut registry = Registry::new(&mut storages);
        assert!(registry.init_all().is_ok());
        let storage = registry.select(".mtd.0").unwrap();
        storage.start(payload.len()).unwrap();
        storage.write(&payload, 0).unwrap();
        storage.finish().unwrap();
        assert_eq!(registry.set_seq_no_all(12).failure_count(), 0);
    }
    // After a restart only the file system backend remembers the sequence number.
    let mut regions = [MtdRegion::new(FileMtd::new(&flash_path, options).unwrap())];
    let mut mtd = Storage::new(MtdStorage::new(HostEnv::new(), &mut regions));
    let mut vfs = Storage::new(VfsStorage::new(HostEnv::new(), fs, FILES));
    let mut storages: [&mut DynStorage; 2] = [&mut mtd, &mut vfs];
    let mut registry = Registry::new(&mut storages);
    assert!(registry.init_all().is_ok());
    assert_eq!(registry.get_highest_seq_no(), Ok(12));
    assert_eq!(registry.check_seq_no(12), Err(StorageError::SequenceRollback));
    let storage = registry.select(".mtd.0").unwrap();
    assert_eq!(storage.get_seq_no(), Ok(0));
    let mut read_back = vec![0; payload.len()];
    storage.read(&mut read_back, 0).unwrap();
    assert_eq!(read_back, payload);
    assert_eq!(
        storage.read(&mut [0; 2], 4095),
        Err(StorageError::CapacityExceeded)
    );
}
