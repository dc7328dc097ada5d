//! Lifecycle hooks and the ordered extension list.
//!
//! A run moves through `PreRun -> (PreBlock -> (PreTransaction -> Process ->
//! PostTransaction)* -> PostBlock)* -> PostRun -> Exit`. Extensions observe
//! and influence that sequence through the hooks below; every hook defaults
//! to a no-op.

use crate::context::Context;
use chronicle_core::{ReplayError, ReplayResult, State};
use std::marker::PhantomData;

/// Lifecycle hook implementation
#[allow(unused_variables)]
pub trait Extension<T>: Send {
    /// Before the first block
    ///
    /// # Errors
    ///
    /// An error skips the main loop; PostRun and Exit still run
    fn pre_run(&mut self, state: State<'_, T>, ctx: &mut Context) -> ReplayResult<()> {
        Ok(())
    }

    /// Before the first transaction of a block
    ///
    /// # Errors
    ///
    /// An error aborts the run
    fn pre_block(&mut self, state: State<'_, T>, ctx: &mut Context) -> ReplayResult<()> {
        Ok(())
    }

    /// Before a transaction is processed
    ///
    /// # Errors
    ///
    /// An error aborts the run
    fn pre_transaction(&mut self, state: State<'_, T>, ctx: &mut Context) -> ReplayResult<()> {
        Ok(())
    }

    /// After a transaction was processed
    ///
    /// # Errors
    ///
    /// An error aborts the run
    fn post_transaction(&mut self, state: State<'_, T>, ctx: &mut Context) -> ReplayResult<()> {
        Ok(())
    }

    /// After the last transaction of a block
    ///
    /// # Errors
    ///
    /// An error aborts the run
    fn post_block(&mut self, state: State<'_, T>, ctx: &mut Context) -> ReplayResult<()> {
        Ok(())
    }

    /// After the main loop; `err` is the error that ended it, if any
    ///
    /// # Errors
    ///
    /// An error is joined with `err`
    fn post_run(
        &mut self,
        state: State<'_, T>,
        ctx: &mut Context,
        err: Option<&ReplayError>,
    ) -> ReplayResult<()> {
        Ok(())
    }

    /// Final cleanup, called exactly once per run
    ///
    /// # Errors
    ///
    /// An error is joined with any earlier error
    fn exit(&mut self, state: State<'_, T>, ctx: &mut Context) -> ReplayResult<()> {
        Ok(())
    }
}

/// Extension doing nothing, returned by constructors of disabled features
pub struct NilExtension<T>(PhantomData<fn() -> T>);

impl<T> NilExtension<T> {
    /// Create a no-op extension
    #[must_use]
    pub fn new() -> Self {
        Self(PhantomData)
    }

    /// Boxed no-op extension
    #[must_use]
    pub fn boxed() -> Box<dyn Extension<T>>
    where
        T: 'static,
    {
        Box::new(Self::new())
    }
}

impl<T> Default for NilExtension<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> std::fmt::Debug for NilExtension<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("NilExtension")
    }
}

impl<T> Extension<T> for NilExtension<T> {}

/// Order in which Post* and Exit hooks visit the registered extensions
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum HookOrder {
    /// Registration order
    Forward,
    /// Reverse registration order, releasing in the opposite order of acquisition
    #[default]
    Reverse,
}

/// Extensions of one run, fixed before PreRun
pub struct ExtensionList<T> {
    extensions: Vec<Box<dyn Extension<T>>>,
    order: HookOrder,
}

impl<T> ExtensionList<T> {
    /// Create an empty list
    #[must_use]
    pub fn new() -> Self {
        Self {
            extensions: Vec::new(),
            order: HookOrder::default(),
        }
    }

    /// Append an extension
    #[must_use]
    pub fn with(mut self, extension: Box<dyn Extension<T>>) -> Self {
        self.extensions.push(extension);
        self
    }

    /// Set the Post*/Exit order
    #[must_use]
    pub fn with_order(mut self, order: HookOrder) -> Self {
        self.order = order;
        self
    }

    /// Append an extension
    pub fn push(&mut self, extension: Box<dyn Extension<T>>) {
        self.extensions.push(extension);
    }

    /// Post*/Exit order
    #[must_use]
    pub fn order(&self) -> HookOrder {
        self.order
    }

    /// Number of registered extensions
    #[must_use]
    pub fn len(&self) -> usize {
        self.extensions.len()
    }

    /// Whether no extension is registered
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.extensions.is_empty()
    }

    /// Run PreRun on every extension in registration order
    ///
    /// # Errors
    ///
    /// Returns the first failure; later extensions are skipped
    pub fn pre_run(&mut self, state: State<'_, T>, ctx: &mut Context) -> ReplayResult<()> {
        self.extensions
            .iter_mut()
            .try_for_each(|e| e.pre_run(state, ctx))
    }

    /// Run PreBlock on every extension in registration order
    ///
    /// # Errors
    ///
    /// Returns the first failure; later extensions are skipped
    pub fn pre_block(&mut self, state: State<'_, T>, ctx: &mut Context) -> ReplayResult<()> {
        self.extensions
            .iter_mut()
            .try_for_each(|e| e.pre_block(state, ctx))
    }

    /// Run PreTransaction on every extension in registration order
    ///
    /// # Errors
    ///
    /// Returns the first failure; later extensions are skipped
    pub fn pre_transaction(&mut self, state: State<'_, T>, ctx: &mut Context) -> ReplayResult<()> {
        self.extensions
            .iter_mut()
            .try_for_each(|e| e.pre_transaction(state, ctx))
    }

    /// Run PostTransaction in hook order
    ///
    /// # Errors
    ///
    /// Returns the first failure; later extensions are skipped
    pub fn post_transaction(&mut self, state: State<'_, T>, ctx: &mut Context) -> ReplayResult<()> {
        self.try_ordered(|e| e.post_transaction(state, ctx))
    }

    /// Run PostBlock in hook order
    ///
    /// # Errors
    ///
    /// Returns the first failure; later extensions are skipped
    pub fn post_block(&mut self, state: State<'_, T>, ctx: &mut Context) -> ReplayResult<()> {
        self.try_ordered(|e| e.post_block(state, ctx))
    }

    /// Run PostRun on every extension in hook order
    ///
    /// # Errors
    ///
    /// Returns all failures joined; every extension is called
    pub fn post_run(
        &mut self,
        state: State<'_, T>,
        ctx: &mut Context,
        err: Option<&ReplayError>,
    ) -> ReplayResult<()> {
        self.join_ordered(|e| e.post_run(state, ctx, err))
    }

    /// Run Exit on every extension in hook order
    ///
    /// # Errors
    ///
    /// Returns all failures joined; every extension is called
    pub fn exit(&mut self, state: State<'_, T>, ctx: &mut Context) -> ReplayResult<()> {
        self.join_ordered(|e| e.exit(state, ctx))
    }

    fn try_ordered<F>(&mut self, f: F) -> ReplayResult<()>
    where
        F: FnMut(&mut Box<dyn Extension<T>>) -> ReplayResult<()>,
    {
        match self.order {
            HookOrder::Forward => self.extensions.iter_mut().try_for_each(f),
            HookOrder::Reverse => self.extensions.iter_mut().rev().try_for_each(f),
        }
    }

    fn join_ordered<F>(&mut self, mut f: F) -> ReplayResult<()>
    where
        F: FnMut(&mut Box<dyn Extension<T>>) -> ReplayResult<()>,
    {
        let mut result = None;
        let mut call = |e: &mut Box<dyn Extension<T>>| {
            result = ReplayError::join(result.take(), f(e).err());
        };
        match self.order {
            HookOrder::Forward => self.extensions.iter_mut().for_each(&mut call),
            HookOrder::Reverse => self.extensions.iter_mut().rev().for_each(&mut call),
        }
        result.map_or(Ok(()), Err)
    }
}

impl<T> Default for ExtensionList<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> FromIterator<Box<dyn Extension<T>>> for ExtensionList<T> {
    fn from_iter<I: IntoIterator<Item = Box<dyn Extension<T>>>>(iter: I) -> Self {
        Self {
            extensions: iter.into_iter().collect(),
            order: HookOrder::default(),
        }
    }
}

impl<T> std::fmt::Debug for ExtensionList<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExtensionList")
            .field("len", &self.extensions.len())
            .field("order", &self.order)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chronicle_core::Config;
    use parking_lot::Mutex;
    use std::sync::Arc;

    type Log = Arc<Mutex<Vec<String>>>;

    struct Named {
        name: &'static str,
        log: Log,
        fail_on: Option<&'static str>,
    }

    impl Named {
        fn record(&self, hook: &'static str) -> ReplayResult<()> {
            self.log.lock().push(format!("{}:{hook}", self.name));
            if self.fail_on == Some(hook) {
                Err(ReplayError::msg(format!("{} failed in {hook}", self.name)))
            } else {
                Ok(())
            }
        }
    }

    impl Extension<()> for Named {
        fn pre_run(&mut self, _: State<'_, ()>, _: &mut Context) -> ReplayResult<()> {
            self.record("pre_run")
        }
        fn post_block(&mut self, _: State<'_, ()>, _: &mut Context) -> ReplayResult<()> {
            self.record("post_block")
        }
        fn post_run(
            &mut self,
            _: State<'_, ()>,
            _: &mut Context,
            _: Option<&ReplayError>,
        ) -> ReplayResult<()> {
            self.record("post_run")
        }
        fn exit(&mut self, _: State<'_, ()>, _: &mut Context) -> ReplayResult<()> {
            self.record("exit")
        }
    }

    fn list(log: &Log, fail: &[Option<&'static str>]) -> ExtensionList<()> {
        ["a", "b", "c"]
            .into_iter()
            .zip(fail.iter().copied())
            .map(|(name, fail_on)| {
                Box::new(Named {
                    name,
                    log: Arc::clone(log),
                    fail_on,
                }) as Box<dyn Extension<()>>
            })
            .collect()
    }

    fn ctx() -> Context {
        Context::with_channel(Arc::new(Config::default())).0
    }

    #[test]
    fn test_pre_hooks_run_in_registration_order() {
        let log = Log::default();
        let mut extensions = list(&log, &[None, None, None]);
        extensions.pre_run(State::at_block(0), &mut ctx()).unwrap();
        assert_eq!(*log.lock(), vec!["a:pre_run", "b:pre_run", "c:pre_run"]);
    }

    #[test]
    fn test_post_hooks_default_to_reverse_order() {
        let log = Log::default();
        let mut extensions = list(&log, &[None, None, None]);
        assert_eq!(extensions.order(), HookOrder::Reverse);
        extensions.post_block(State::at_block(0), &mut ctx()).unwrap();
        assert_eq!(*log.lock(), vec!["c:post_block", "b:post_block", "a:post_block"]);
    }

    #[test]
    fn test_forward_order_policy() {
        let log = Log::default();
        let mut extensions = list(&log, &[None, None, None]).with_order(HookOrder::Forward);
        extensions.exit(State::at_block(0), &mut ctx()).unwrap();
        assert_eq!(*log.lock(), vec!["a:exit", "b:exit", "c:exit"]);
    }

    #[test]
    fn test_pre_run_stops_at_first_failure() {
        let log = Log::default();
        let mut extensions = list(&log, &[None, Some("pre_run"), None]);
        let err = extensions.pre_run(State::at_block(0), &mut ctx()).unwrap_err();
        assert_eq!(err, ReplayError::msg("b failed in pre_run"));
        assert_eq!(*log.lock(), vec!["a:pre_run", "b:pre_run"]);
    }

    #[test]
    fn test_exit_calls_everyone_and_joins_errors() {
        let log = Log::default();
        let mut extensions = list(&log, &[Some("exit"), None, Some("exit")]);
        let err = extensions.exit(State::at_block(0), &mut ctx()).unwrap_err();
        assert_eq!(log.lock().len(), 3);
        assert_eq!(
            err,
            ReplayError::Multiple(vec![
                ReplayError::msg("c failed in exit"),
                ReplayError::msg("a failed in exit"),
            ])
        );
    }

    #[test]
    fn test_nil_extension_is_inert() {
        let mut extensions = ExtensionList::new().with(NilExtension::<()>::boxed());
        let mut ctx = ctx();
        let state = State::at_block(3);
        assert!(extensions.pre_run(state, &mut ctx).is_ok());
        assert!(extensions.post_run(state, &mut ctx, None).is_ok());
        assert!(extensions.exit(state, &mut ctx).is_ok());
        assert_eq!(extensions.len(), 1);
    }
}
