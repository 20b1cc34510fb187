/// Open-on-first-pull state shared by every lazy stream.
///
/// `Pending` holds no resources. The cursor is created by the first pull, and the stream moves
/// to `Done` (dropping the cursor and its file handle) on exhaustion or on the first error.
pub(crate) enum Lazy<C> {
    Pending,
    Open(C),
    Done,
}

impl<C> Lazy<C> {
    pub(crate) fn pull<T>(
        &mut self,
        open: impl FnOnce() -> crate::LoadResult<C>,
        next: impl FnOnce(&mut C) -> Option<crate::LoadResult<T>>,
    ) -> Option<crate::LoadResult<T>> {
        if matches!(self, Lazy::Pending) {
            match open() {
                Ok(cursor) => *self = Lazy::Open(cursor),
                Err(e) => {
                    *self = Lazy::Done;
                    return Some(Err(e));
                }
            }
        }

        let item = match self {
            Lazy::Open(cursor) => next(cursor),
            _ => return None,
        };
        if !matches!(item, Some(Ok(_))) {
            *self = Lazy::Done;
        }
        item
    }

    pub(crate) fn state_name(&self) -> &'static str {
        match self {
            Lazy::Pending => "pending",
            Lazy::Open(_) => "open",
            Lazy::Done => "done",
        }
    }

    pub(crate) fn is_open(&self) -> bool {
        matches!(self, Lazy::Open(_))
    }
}
