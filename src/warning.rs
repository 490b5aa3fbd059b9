//! Per-document warnings of reference resolution.
//!
//! Each document is resolved inside [`for_document`]. Anything reported with
//! [`warn_document!`](crate::warn_document) while that future runs is kept,
//! once per distinct message, and returned next to its result.

use std::cell::RefCell;

use indexmap::IndexSet;

tokio::task_local! {
    static DOCUMENT_WARNINGS: RefCell<IndexSet<String>>;
}

/// Report a problem with the document being resolved. Dropped outside of
/// [`for_document`].
pub fn report(message: String) {
    let _ = DOCUMENT_WARNINGS.try_with(|warnings| {
        warnings.borrow_mut().insert(message);
    });
}

pub async fn for_document<F: Future>(resolve: F) -> (F::Output, Vec<String>) {
    DOCUMENT_WARNINGS
        .scope(RefCell::new(IndexSet::new()), async {
            let output = resolve.await;
            let warnings = DOCUMENT_WARNINGS.with(|warnings| warnings.take());
            (output, warnings.into_iter().collect())
        })
        .await
}

#[macro_export]
macro_rules! warn_document {
    ($($arg:tt)*) => {
        $crate::warning::report(format!($($arg)*))
    };
}
