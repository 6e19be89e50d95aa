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

//! Install hook chains
//!
//! Every [`Storage`](crate::Storage) owns a pre-install and a post-install [`HookChain`]. A chain
//! is an intrusive singly-linked list of caller-owned [`Hook`] nodes, newest first. The chain never
//! owns or allocates nodes.
//!
//! Chains may be mutated from contexts that can be interrupted by code touching the same chain.
//! Each mutation runs with interrupts disabled through the platform's [`InterruptControl`] and
//! holds a spin lock for multi-core targets. Both are released on every exit path.
//!
//! A node belongs to at most one chain at a time. Its link field is only accessed while the lock
//! of that chain is held.

use crate::storage::StorageResult;
use core::cell::UnsafeCell;
use core::sync::atomic::{AtomicBool, Ordering};
use spin::Mutex;

/// Whether a hook runs before or after the install step.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HookStage {
    PreInstall,
    PostInstall,
}

/// Describes the install step a hook is called for.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct InstallInfo {
    pub stage: HookStage,
    /// Sequence number of the image being installed.
    pub seq_no: u32,
}

pub type HookCallback<'h> = &'h (dyn Fn(&InstallInfo) -> StorageResult<()> + Sync);

/// Represents a possible hook registration error.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HookError {
    /// The hook is already linked into a chain.
    AlreadyLinked,
}

/// Outcome of removing a hook from a chain.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HookRemoval {
    Removed,

    /// The hook was not in the chain, which is left unchanged.
    NotFound,
}

/// Caller-owned node of a hook chain.
pub struct Hook<'h> {
    callback: HookCallback<'h>,
    next: UnsafeCell<Option<&'h Hook<'h>>>,
    linked: AtomicBool,
}

// SAFETY: `next` is only accessed by the chain that claimed the node through `linked`, while the
// lock of that chain is held.
unsafe impl Sync for Hook<'_> {}

impl<'h> Hook<'h> {
    pub const fn new(callback: HookCallback<'h>) -> Self {
        Hook {
            callback,
            next: UnsafeCell::new(None),
            linked: AtomicBool::new(false),
        }
    }

    /// Returns whether the hook is currently part of a chain.
    pub fn is_linked(&self) -> bool {
        self.linked.load(Ordering::Acquire)
    }

    /// Calls the hook.
    pub fn invoke(&self, info: &InstallInfo) -> StorageResult<()> {
        (self.callback)(info)
    }
}

/// Disables and restores interrupts around chain mutations.
///
/// Single-core interrupt-driven targets implement this with their interrupt controller. Hosted
/// builds without interrupts use [`NoInterrupts`].
pub trait InterruptControl: Sync {
    /// Disables interrupts and returns whether they were enabled before.
    fn disable(&self) -> bool;

    /// Restores the state returned by the matching [`disable`](InterruptControl::disable).
    fn restore(&self, was_enabled: bool);
}

/// Interrupt control for targets without interrupts.
pub struct NoInterrupts;

impl InterruptControl for NoInterrupts {
    fn disable(&self) -> bool {
        false
    }

    fn restore(&self, _was_enabled: bool) {}
}

/// Keeps interrupts disabled until dropped.
pub struct IrqGuard<'a> {
    irq: &'a dyn InterruptControl,
    was_enabled: bool,
}

impl<'a> IrqGuard<'a> {
    pub fn new(irq: &'a dyn InterruptControl) -> Self {
        let was_enabled = irq.disable();
        IrqGuard { irq, was_enabled }
    }
}

impl Drop for IrqGuard<'_> {
    fn drop(&mut self) {
        self.irq.restore(self.was_enabled);
    }
}

/// LIFO chain of install hooks.
pub struct HookChain<'h> {
    head: Mutex<Option<&'h Hook<'h>>>,
    irq: &'static dyn InterruptControl,
}

impl<'h> HookChain<'h> {
    /// Creates an empty chain for targets without interrupts.
    pub fn new() -> Self {
        HookChain::with_interrupt_control(&NoInterrupts)
    }

    /// Creates an empty chain using the platform's interrupt control.
    pub fn with_interrupt_control(irq: &'static dyn InterruptControl) -> Self {
        HookChain {
            head: Mutex::new(None),
            irq,
        }
    }

    /// Links `hook` at the head of the chain.
    ///
    /// # Errors
    ///
    /// Returns [`HookError::AlreadyLinked`] if the hook is part of this or another chain.
    pub fn add(&self, hook: &'h Hook<'h>) -> Result<(), HookError> {
        let _irq = IrqGuard::new(self.irq);
        let mut head = self.head.lock();
        if hook.linked.swap(true, Ordering::AcqRel) {
            return Err(HookError::AlreadyLinked);
        }
        // SAFETY: The node was just claimed by this chain and its lock is held.
        unsafe { *hook.next.get() = *head };
        *head = Some(hook);
        Ok(())
    }

    /// Unlinks `hook`, identified by address.
    pub fn remove(&self, hook: &'h Hook<'h>) -> HookRemoval {
        let _irq = IrqGuard::new(self.irq);
        let mut head = self.head.lock();
        let mut link: *mut Option<&'h Hook<'h>> = &mut *head;
        // SAFETY: Every node reachable from the head is linked into this chain, so its link field
        // is only accessed under the lock we hold.
        unsafe {
            while let Some(node) = *link {
                if core::ptr::eq(node, hook) {
                    *link = *node.next.get();
                    *node.next.get() = None;
                    node.linked.store(false, Ordering::Release);
                    return HookRemoval::Removed;
                }
                link = node.next.get();
            }
        }
        HookRemoval::NotFound
    }

    /// Returns the hook at `index`, counting from the most recently added.
    pub fn get(&self, index: usize) -> Option<&'h Hook<'h>> {
        let _irq = IrqGuard::new(self.irq);
        let head = self.head.lock();
        let mut node = *head;
        for _ in 0..index {
            // SAFETY: The node is linked into this chain and its lock is held.
            node = unsafe { *node?.next.get() };
        }
        node
    }

    /// Returns the number of hooks in the chain.
    pub fn len(&self) -> usize {
        self.iter().count()
    }

    pub fn is_empty(&self) -> bool {
        self.get(0).is_none()
    }

    /// Iterates over the hooks, most recently added first.
    ///
    /// Callbacks run without holding the lock, so a hook may add or remove hooks. The lock is
    /// taken once per step: a concurrent mutation may make the iteration skip or repeat a hook.
    ///
    /// Each step walks the chain from the head, since the previous node may have been unlinked
    /// meanwhile. A full iteration is thus quadratic in the chain length and disables interrupts
    /// once per step. Chains are expected to hold a handful of hooks.
    pub fn iter(&self) -> HookIter<'_, 'h> {
        HookIter {
            chain: self,
            index: 0,
        }
    }

    /// Runs every hook in order, stopping at the first failure.
    pub fn run(&self, info: &InstallInfo) -> StorageResult<()> {
        for hook in self.iter() {
            hook.invoke(info)?;
        }
        Ok(())
    }

    /// Runs every hook in order and returns the first failure, if any.
    pub fn run_all(&self, info: &InstallInfo) -> StorageResult<()> {
        let mut result = Ok(());
        for hook in self.iter() {
            let status = hook.invoke(info);
            if result.is_ok() {
                result = status;
            }
        }
        result
    }
}

impl Drop for HookChain<'_> {
    /// Unlinks every remaining hook, so it can be added to another chain.
    fn drop(&mut self) {
        let mut node = self.head.get_mut().take();
        while let Some(hook) = node {
            // SAFETY: The node is linked into this chain, which is exclusively borrowed.
            node = unsafe { (*hook.next.get()).take() };
            hook.linked.store(false, Ordering::Release);
        }
    }
}

impl Default for HookChain<'_> {
    fn default() -> Self {
        Self::new()
    }
}

pub struct HookIter<'a, 'h> {
    chain: &'a HookChain<'h>,
    index: usize,
}

impl<'a, 'h> Iterator for HookIter<'a, 'h> {
    type Item = &'h Hook<'h>;

    fn next(&mut self) -> Option<Self::Item> {
        let hook = self.chain.get(self.index)?;
        self.index += 1;
        Some(hook)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::storage::StorageError;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Mutex as StdMutex;

    fn ok(_: &InstallInfo) -> StorageResult<()> {
        Ok(())
    }

    fn order<'h>(chain: &HookChain<'h>, hooks: &[&'h Hook<'h>]) -> Vec<usize> {
        chain
            .iter()
            .map(|node| {
                hooks
                    .iter()
                    .position(|hook| core::ptr::eq(*hook, node))
                    .unwrap()
            })
            .collect()
    }

    #[test]
    fn test_add_is_lifo() {
        let a = Hook::new(&ok);
        let b = Hook::new(&ok);
        let c = Hook::new(&ok);
        let chain = HookChain::new();
        assert!(chain.is_empty());
        chain.add(&a).unwrap();
        chain.add(&b).unwrap();
        chain.add(&c).unwrap();
        assert_eq!(order(&chain, &[&a, &b, &c]), vec![2, 1, 0]);
        assert_eq!(chain.len(), 3);
    }

    #[test]
    fn test_remove_middle() {
        let a = Hook::new(&ok);
        let b = Hook::new(&ok);
        let c = Hook::new(&ok);
        let chain = HookChain::new();
        chain.add(&a).unwrap();
        chain.add(&b).unwrap();
        chain.add(&c).unwrap();
        assert_eq!(chain.remove(&b), HookRemoval::Removed);
        assert!(!b.is_linked());
        assert_eq!(order(&chain, &[&a, &b, &c]), vec![2, 0]);
        assert_eq!(chain.remove(&c), HookRemoval::Removed);
        assert_eq!(chain.remove(&a), HookRemoval::Removed);
        assert!(chain.is_empty());
    }

    #[test]
    fn test_remove_missing() {
        let a = Hook::new(&ok);
        let b = Hook::new(&ok);
        let chain = HookChain::new();
        assert_eq!(chain.remove(&a), HookRemoval::NotFound);
        chain.add(&a).unwrap();
        assert_eq!(chain.remove(&b), HookRemoval::NotFound);
        assert_eq!(order(&chain, &[&a]), vec![0]);
        assert_eq!(chain.remove(&a), HookRemoval::Removed);
        assert_eq!(chain.remove(&a), HookRemoval::NotFound);
    }

    #[test]
    fn test_hook_in_one_chain_only() {
        let a = Hook::new(&ok);
        let pre = HookChain::new();
        let post = HookChain::new();
        pre.add(&a).unwrap();
        assert_eq!(pre.add(&a), Err(HookError::AlreadyLinked));
        assert_eq!(post.add(&a), Err(HookError::AlreadyLinked));
        assert_eq!(post.remove(&a), HookRemoval::NotFound);
        assert_eq!(pre.len(), 1);
        assert_eq!(pre.remove(&a), HookRemoval::Removed);
        assert!(post.add(&a).is_ok());
        assert!(a.is_linked());
    }

    #[test]
    fn test_run_stops_at_first_failure() {
        let calls = StdMutex::new(Vec::new());
        let first = |_: &InstallInfo| -> StorageResult<()> {
            calls.lock().unwrap().push("first");
            Ok(())
        };
        let failing = |_: &InstallInfo| -> StorageResult<()> {
            calls.lock().unwrap().push("failing");
            Err(StorageError::StorageFault)
        };
        let last = |_: &InstallInfo| -> StorageResult<()> {
            calls.lock().unwrap().push("last");
            Ok(())
        };
        let (a, b, c) = (Hook::new(&last), Hook::new(&failing), Hook::new(&first));
        let chain = HookChain::new();
        chain.add(&a).unwrap();
        chain.add(&b).unwrap();
        chain.add(&c).unwrap();
        let info = InstallInfo {
            stage: HookStage::PreInstall,
            seq_no: 1,
        };
        assert_eq!(chain.run(&info), Err(StorageError::StorageFault));
        assert_eq!(*calls.lock().unwrap(), vec!["first", "failing"]);
        calls.lock().unwrap().clear();
        assert_eq!(chain.run_all(&info), Err(StorageError::StorageFault));
        assert_eq!(*calls.lock().unwrap(), vec!["first", "failing", "last"]);
    }

    #[test]
    fn test_hook_receives_info() {
        let seen = StdMutex::new(None);
        let record = |info: &InstallInfo| -> StorageResult<()> {
            *seen.lock().unwrap() = Some(*info);
            Ok(())
        };
        let hook = Hook::new(&record);
        let info = InstallInfo {
            stage: HookStage::PostInstall,
            seq_no: 42,
        };
        assert!(hook.invoke(&info).is_ok());
        assert_eq!(*seen.lock().unwrap(), Some(info));
    }

    #[test]
    fn test_dropped_chain_releases_hooks() {
        let a = Hook::new(&ok);
        let b = Hook::new(&ok);
        {
            let chain = HookChain::new();
            chain.add(&a).unwrap();
            chain.add(&b).unwrap();
        }
        assert!(!a.is_linked());
        assert!(!b.is_linked());
        let chain = HookChain::new();
        assert_eq!(chain.add(&b), Ok(()));
        assert_eq!(chain.add(&a), Ok(()));
        assert_eq!(order(&chain, &[&a, &b]), vec![0, 1]);
    }

    struct CountingIrq {
        enabled: AtomicBool,
        disables: AtomicUsize,
        restores: AtomicUsize,
    }

    impl InterruptControl for CountingIrq {
        fn disable(&self) -> bool {
            self.disables.fetch_add(1, Ordering::SeqCst);
            self.enabled.swap(false, Ordering::SeqCst)
        }

        fn restore(&self, was_enabled: bool) {
            self.restores.fetch_add(1, Ordering::SeqCst);
            self.enabled.store(was_enabled, Ordering::SeqCst);
        }
    }

    static IRQ: CountingIrq = CountingIrq {
        enabled: AtomicBool::new(true),
        disables: AtomicUsize::new(0),
        restores: AtomicUsize::new(0),
    };

    #[test]
    fn test_interrupts_restored_on_every_path() {
        let a = Hook::new(&ok);
        let b = Hook::new(&ok);
        let chain = HookChain::with_interrupt_control(&IRQ);
        chain.add(&a).unwrap();
        assert_eq!(chain.add(&a), Err(HookError::AlreadyLinked));
        assert_eq!(chain.remove(&b), HookRemoval::NotFound);
        assert_eq!(chain.remove(&a), HookRemoval::Removed);
        assert!(chain.get(0).is_none());
        assert_eq!(IRQ.disables.load(Ordering::SeqCst), 5);
        assert_eq!(IRQ.restores.load(Ordering::SeqCst), 5);
        assert!(IRQ.enabled.load(Ordering::SeqCst));
    }
}
