//! `#[derive(Patch)]` on structs of optional fields.

use std::cell::RefCell;
use std::rc::Rc;

use futures::executor::LocalPool;
use pretty_assertions::assert_eq;
use update_coalescer::patch::Patch;
use update_coalescer::{BoxError, CoalescingQueue, Update, UpdateError};
use update_coalescer_macros::Patch;

#[derive(Patch, Debug, Clone, Default, PartialEq)]
struct UserPatch {
    name: Option<String>,
    email: Option<String>,
    age: Option<u8>,
}

#[derive(Patch, Debug, Clone, PartialEq)]
struct Tagged<T> {
    tag: Option<T>,
}

#[test]
fn default_patch_is_empty() {
    assert!(UserPatch::default().is_empty());
    assert!(!UserPatch {
        age: Some(30),
        ..Default::default()
    }
    .is_empty());
}

#[test]
fn merge_overwrites_present_fields_only() {
    let mut acc = UserPatch {
        name: Some("ada".into()),
        email: Some("ada@old".into()),
        age: None,
    };
    acc.merge(UserPatch {
        name: None,
        email: Some("ada@new".into()),
        age: Some(36),
    });

    assert_eq!(
        acc,
        UserPatch {
            name: Some("ada".into()),
            email: Some("ada@new".into()),
            age: Some(36),
        }
    );
}

#[test]
fn generic_patch_merges() {
    let mut acc = Tagged { tag: Some(1) };
    acc.merge(Tagged { tag: Some(2) });
    assert_eq!(acc.tag, Some(2));
    acc.merge(Tagged { tag: None });
    assert_eq!(acc.tag, Some(2));
}

#[test]
fn derived_patch_through_the_queue() {
    let mut pool = LocalPool::new();
    let seen = Rc::new(RefCell::new(Vec::new()));
    let seen_c = Rc::clone(&seen);
    let queue = CoalescingQueue::with_scheduler(
        move |update: Update<&'static str, UserPatch>| {
            seen_c.borrow_mut().push(update.clone());
            async move { Ok::<_, BoxError>(update.value.name.unwrap_or_default()) }
        },
        pool.spawner(),
    );

    let a = queue.submit(
        "user-1",
        UserPatch {
            name: Some("ada".into()),
            ..Default::default()
        },
    );
    let b = queue.submit(
        "user-1",
        UserPatch {
            age: Some(36),
            ..Default::default()
        },
    );
    let empty = queue.submit("user-1", UserPatch::default());
    assert!(a.ptr_eq(&b));

    let (a, b) = pool.run_until(futures::future::join(a, b));
    assert_eq!(a.unwrap(), "ada");
    assert_eq!(b.unwrap(), "ada");
    assert!(matches!(
        pool.run_until(empty),
        Err(UpdateError::EmptyUpdate)
    ));
    assert_eq!(
        *seen.borrow(),
        vec![Update {
            key: "user-1",
            value: UserPatch {
                name: Some("ada".into()),
                email: None,
                age: Some(36),
            },
        }]
    );
}
