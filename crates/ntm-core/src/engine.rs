//! The time-step recurrence.
//!
//! Each step runs, in order:
//! 1. erase: every write head's `1 - w ⊗ e`, compounding across heads
//! 2. add: every write head's `w ⊗ (sign * a)`, only after all erasures
//! 3. read: every read head's `w · M` on the written memory, concatenated
//! 4. controller step on `(x_t, reads, state)`
//! 5. new weightings for all heads (write heads first) from the new hidden
//!    state and the written memory
//!
//! Erase and add vectors come from the previous hidden state and use the
//! previous weightings. Steps are strictly sequential; batch rows never
//! interact.

use ndarray::{Array2, Array3, Array4, ArrayView1, ArrayView2, ArrayView3, Axis, s};

use crate::controller::Controller;
use crate::error::{NtmError, Result};
use crate::head::{Addressing, Head, WriteContent};
use crate::memory::{Memory, MemoryBank};
use crate::params::{Param, ParamFilter};

/// Everything carried from one step to the next.
#[derive(Clone, Debug)]
pub struct RecurrentState {
    pub memory: MemoryBank,
    pub hidden: Array2<f64>,
    pub controller_state: Array2<f64>,
    /// One `(batch, slots)` weighting per write head, in list order.
    pub write_weightings: Vec<Array2<f64>>,
    /// One `(batch, slots)` weighting per read head, in list order.
    pub read_weightings: Vec<Array2<f64>>,
}

impl RecurrentState {
    pub fn batch_size(&self) -> usize {
        self.hidden.nrows()
    }

    /// All weightings, write heads first.
    pub fn weightings(&self) -> impl Iterator<Item = &Array2<f64>> {
        self.write_weightings.iter().chain(&self.read_weightings)
    }
}

/// Per-step record of every recurrent channel, batch-major.
#[derive(Clone, Debug)]
pub struct FullTrace {
    /// `(batch, time, slots, slot_width)`, memory after each step's write.
    pub memory: Array4<f64>,
    /// `(batch, time, hidden_width)`
    pub hidden: Array3<f64>,
    /// `(batch, time, state_width)`
    pub controller_state: Array3<f64>,
    /// One `(batch, time, slots)` array per head, write heads first.
    pub weightings: Vec<Array3<f64>>,
    num_write: usize,
}

impl FullTrace {
    pub fn write_weightings(&self) -> &[Array3<f64>] {
        &self.weightings[..self.num_write]
    }

    pub fn read_weightings(&self) -> &[Array3<f64>] {
        &self.weightings[self.num_write..]
    }
}

#[derive(Clone, Debug)]
pub enum NtmOutput {
    /// `(batch, time, hidden_width)`
    Hidden(Array3<f64>),
    Full(FullTrace),
}

impl NtmOutput {
    /// Controller hidden states, whichever detail was requested.
    pub fn hidden(&self) -> &Array3<f64> {
        match self {
            NtmOutput::Hidden(h) => h,
            NtmOutput::Full(trace) => &trace.hidden,
        }
    }

    pub fn into_hidden(self) -> Array3<f64> {
        match self {
            NtmOutput::Hidden(h) => h,
            NtmOutput::Full(trace) => trace.hidden,
        }
    }

    pub fn into_trace(self) -> Option<FullTrace> {
        match self {
            NtmOutput::Hidden(_) => None,
            NtmOutput::Full(trace) => Some(trace),
        }
    }
}

/// Drives the memory recurrence over batched sequences.
pub struct NtmEngine<C> {
    memory: Memory,
    controller: C,
    write_heads: Vec<Box<dyn WriteContent>>,
    read_heads: Vec<Box<dyn Addressing>>,
    grad_clipping: Option<f64>,
}

impl<C: Controller> NtmEngine<C> {
    /// Classify `heads` by kind and check every static dimension.
    ///
    /// Heads may come in any order; write heads keep their relative order,
    /// as do read heads. `grad_clipping` is stored but never applied.
    pub fn new(
        memory: Memory,
        controller: C,
        heads: Vec<Head>,
        grad_clipping: Option<f64>,
    ) -> Result<Self> {
        if heads.is_empty() {
            return Err(NtmError::Configuration("head list is empty".into()));
        }
        if let Some(bound) = grad_clipping.filter(|b| !(b.is_finite() && *b > 0.0)) {
            return Err(NtmError::Configuration(format!(
                "gradient clipping bound must be finite and positive, got {bound}"
            )));
        }

        let (slots, width) = memory.shape();
        let interleaved = heads
            .windows(2)
            .any(|pair| !pair[0].is_write() && pair[1].is_write());

        let mut write_heads = Vec::new();
        let mut read_heads = Vec::new();
        for head in heads {
            match head {
                Head::Write(h) => {
                    let name = format!("write_head[{}]", write_heads.len());
                    check_head(&name, h.as_ref(), slots, width)?;
                    write_heads.push(h);
                }
                Head::Read(h) => {
                    let name = format!("read_head[{}]", read_heads.len());
                    check_head(&name, h.as_ref(), slots, width)?;
                    read_heads.push(h);
                }
            }
        }
        if write_heads.is_empty() {
            return Err(NtmError::Configuration("at least one write head is required".into()));
        }
        if read_heads.is_empty() {
            return Err(NtmError::Configuration("at least one read head is required".into()));
        }

        let read_width = read_heads.len() * width;
        if controller.read_width() != read_width {
            return Err(NtmError::shape(
                "controller read width",
                &[read_width],
                &[controller.read_width()],
            ));
        }
        check_len(
            "controller initial hidden",
            controller.initial_hidden(),
            controller.hidden_width(),
        )?;
        check_len(
            "controller initial state",
            controller.initial_state(),
            controller.state_width(),
        )?;

        if interleaved {
            tracing::debug!("read heads precede write heads in the head list; classified by kind");
        }
        if let Some(bound) = grad_clipping {
            tracing::warn!(bound, "gradient clipping bound is stored but not applied");
        }
        tracing::debug!(
            write_heads = write_heads.len(),
            read_heads = read_heads.len(),
            slots,
            slot_width = width,
            hidden_width = controller.hidden_width(),
            "engine constructed"
        );

        Ok(Self {
            memory,
            controller,
            write_heads,
            read_heads,
            grad_clipping,
        })
    }

    pub fn memory(&self) -> &Memory {
        &self.memory
    }

    pub fn controller(&self) -> &C {
        &self.controller
    }

    pub fn num_write_heads(&self) -> usize {
        self.write_heads.len()
    }

    pub fn num_read_heads(&self) -> usize {
        self.read_heads.len()
    }

    pub fn grad_clipping(&self) -> Option<f64> {
        self.grad_clipping
    }

    /// `(batch, time, hidden_width)` for a `(batch, time, ·)` input.
    pub fn output_shape(&self, batch: usize, time: usize) -> (usize, usize, usize) {
        (batch, time, self.controller.hidden_width())
    }

    /// Union of controller, memory and head parameters matching `filter`.
    /// The engine has none of its own.
    pub fn params(&self, filter: &ParamFilter) -> Vec<Param<'_>> {
        let mut params = prefixed(self.controller.params(), "controller");
        params.extend(prefixed(self.memory.params(), "memory"));
        for (i, head) in self.write_heads.iter().enumerate() {
            params.extend(prefixed(head.params(), &format!("write_head[{i}]")));
        }
        for (j, head) in self.read_heads.iter().enumerate() {
            params.extend(prefixed(head.params(), &format!("read_head[{j}]")));
        }
        params.retain(|p| filter.matches(p.tags));
        params
    }

    /// State before step 0: tiled memory, controller and head initial values.
    pub fn initial_state(&self, batch: usize) -> RecurrentState {
        RecurrentState {
            memory: self.memory.tile(batch),
            hidden: tile_rows(self.controller.initial_hidden(), batch),
            controller_state: tile_rows(self.controller.initial_state(), batch),
            write_weightings: self
                .write_heads
                .iter()
                .map(|h| tile_rows(h.weights_init(), batch))
                .collect(),
            read_weightings: self
                .read_heads
                .iter()
                .map(|h| tile_rows(h.weights_init(), batch))
                .collect(),
        }
    }

    /// Advance `previous` by one step on `input` (`(batch, input_width)`).
    ///
    /// `previous` must agree with this engine: memory `(batch, slots,
    /// slot_width)`, one `(batch, slots)` weighting per head, and hidden and
    /// controller state of the controller's widths.
    pub fn step(
        &self,
        t: usize,
        input: ArrayView2<f64>,
        previous: RecurrentState,
    ) -> Result<RecurrentState> {
        self.check_state(&previous)?;
        let batch = previous.batch_size();
        let (slots, width) = self.memory.shape();
        let hidden_prev = previous.hidden.view();
        expect_dim(
            || format!("input at step {t}"),
            &[batch, self.controller.input_width()],
            input.shape(),
        )?;

        // Erase, then add, across all write heads.
        let mut erases = Vec::with_capacity(self.write_heads.len());
        for (i, head) in self.write_heads.iter().enumerate() {
            let e = head
                .erase(hidden_prev)
                .map_err(|source| NtmError::collaborator(t, component(i, "erase"), source))?;
            expect_dim(|| component(i, "erase"), &[batch, width], e.shape())?;
            erases.push(e);
        }
        let erased = previous
            .memory
            .apply_erase(&previous.write_weightings, &erases);

        let mut adds = Vec::with_capacity(self.write_heads.len());
        for (i, head) in self.write_heads.iter().enumerate() {
            let sign = head
                .sign_add(hidden_prev)
                .map_err(|source| NtmError::collaborator(t, component(i, "sign_add"), source))?;
            let add = head
                .add(hidden_prev)
                .map_err(|source| NtmError::collaborator(t, component(i, "add"), source))?;
            expect_dim(|| component(i, "add"), &[batch, width], add.shape())?;
            let signed = match sign {
                None => add,
                Some(sign) => {
                    let cols = sign.ncols();
                    if sign.nrows() != batch || (cols != 1 && cols != width) {
                        return Err(NtmError::shape(
                            component(i, "sign_add"),
                            &[batch, width],
                            sign.shape(),
                        ));
                    }
                    &add * &sign
                }
            };
            adds.push(signed);
        }
        let memory = erased.apply_add(&previous.write_weightings, &adds);

        // Read with the previous read weightings from the written memory.
        let mut reads = Array2::zeros((batch, self.read_heads.len() * width));
        for (j, w) in previous.read_weightings.iter().enumerate() {
            reads
                .slice_mut(s![.., j * width..(j + 1) * width])
                .assign(&memory.read(w.view()));
        }

        let (hidden, controller_state) = self
            .controller
            .step(input, reads.view(), previous.controller_state.view())
            .map_err(|source| NtmError::collaborator(t, "controller.step", source))?;
        expect_dim(
            || "controller hidden".into(),
            &[batch, self.controller.hidden_width()],
            hidden.shape(),
        )?;
        expect_dim(
            || "controller state".into(),
            &[batch, self.controller.state_width()],
            controller_state.shape(),
        )?;

        let write_weightings = next_weightings(
            t,
            "write_head",
            &self.write_heads,
            &previous.write_weightings,
            hidden.view(),
            memory.view(),
        )?;
        let read_weightings = next_weightings(
            t,
            "read_head",
            &self.read_heads,
            &previous.read_weightings,
            hidden.view(),
            memory.view(),
        )?;

        tracing::trace!(step = t, "recurrence step complete");

        Ok(RecurrentState {
            memory,
            hidden,
            controller_state,
            write_weightings,
            read_weightings,
        })
    }

    /// Run the recurrence over `input` (`(batch, time, input_width)`).
    ///
    /// With `return_full_trace` unset only the hidden states are kept.
    pub fn run(&self, input: ArrayView3<f64>, return_full_trace: bool) -> Result<NtmOutput> {
        if return_full_trace {
            self.trace(input).map(NtmOutput::Full)
        } else {
            self.forward(input).map(NtmOutput::Hidden)
        }
    }

    /// Controller hidden state at every step, `(batch, time, hidden_width)`.
    pub fn forward(&self, input: ArrayView3<f64>) -> Result<Array3<f64>> {
        let (batch, time, _) = input.dim();
        let mut hidden = Array3::zeros(self.output_shape(batch, time));
        self.scan(input, false, |t, state| {
            hidden.index_axis_mut(Axis(1), t).assign(&state.hidden);
        })?;
        Ok(hidden)
    }

    /// Every recurrent channel at every step.
    pub fn trace(&self, input: ArrayView3<f64>) -> Result<FullTrace> {
        let (batch, time, _) = input.dim();
        let (slots, width) = self.memory.shape();
        let num_heads = self.write_heads.len() + self.read_heads.len();
        let mut trace = FullTrace {
            memory: Array4::zeros((batch, time, slots, width)),
            hidden: Array3::zeros(self.output_shape(batch, time)),
            controller_state: Array3::zeros((batch, time, self.controller.state_width())),
            weightings: (0..num_heads)
                .map(|_| Array3::zeros((batch, time, slots)))
                .collect(),
            num_write: self.write_heads.len(),
        };
        self.scan(input, true, |t, state| {
            trace
                .memory
                .index_axis_mut(Axis(1), t)
                .assign(&state.memory.view());
            trace
                .hidden
                .index_axis_mut(Axis(1), t)
                .assign(&state.hidden);
            trace
                .controller_state
                .index_axis_mut(Axis(1), t)
                .assign(&state.controller_state);
            for (channel, w) in trace.weightings.iter_mut().zip(state.weightings()) {
                channel.index_axis_mut(Axis(1), t).assign(w);
            }
        })?;
        Ok(trace)
    }

    /// Thread the state through every time index, handing each new state to
    /// `record`. Returns the final state.
    fn scan<F>(
        &self,
        input: ArrayView3<f64>,
        full_trace: bool,
        mut record: F,
    ) -> Result<RecurrentState>
    where
        F: FnMut(usize, &RecurrentState),
    {
        let (batch, time, features) = input.dim();
        if features != self.controller.input_width() {
            return Err(NtmError::shape(
                "input features",
                &[self.controller.input_width()],
                &[features],
            ));
        }
        tracing::debug!(batch, time, full_trace, "running recurrence");

        let mut state = self.initial_state(batch);
        for t in 0..time {
            state = self.step(t, input.index_axis(Axis(1), t), state)?;
            record(t, &state);
        }
        Ok(state)
    }

    /// Reject a carried state whose dimensions disagree with this engine.
    fn check_state(&self, state: &RecurrentState) -> Result<()> {
        let batch = state.batch_size();
        let (slots, width) = self.memory.shape();
        expect_dim(
            || "carried memory".into(),
            &[batch, slots, width],
            state.memory.view().shape(),
        )?;
        expect_dim(
            || "carried hidden".into(),
            &[batch, self.controller.hidden_width()],
            state.hidden.shape(),
        )?;
        expect_dim(
            || "carried controller state".into(),
            &[batch, self.controller.state_width()],
            state.controller_state.shape(),
        )?;
        check_weightings(
            "write_head",
            &state.write_weightings,
            self.write_heads.len(),
        )?;
        check_weightings("read_head", &state.read_weightings, self.read_heads.len())?;
        for w in state.weightings() {
            if w.dim() != (batch, slots) {
                return Err(NtmError::shape("carried weighting", &[batch, slots], w.shape()));
            }
        }
        Ok(())
    }
}

impl<C: Controller + std::fmt::Debug> std::fmt::Debug for NtmEngine<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NtmEngine")
            .field("memory_shape", &self.memory.shape())
            .field("controller", &self.controller)
            .field("write_heads", &self.write_heads.len())
            .field("read_heads", &self.read_heads.len())
            .field("grad_clipping", &self.grad_clipping)
            .finish()
    }
}

/// New weighting for each head from the new hidden state and written memory.
fn next_weightings<H: Addressing + ?Sized>(
    t: usize,
    kind: &str,
    heads: &[Box<H>],
    previous: &[Array2<f64>],
    hidden: ArrayView2<f64>,
    memory: ArrayView3<f64>,
) -> Result<Vec<Array2<f64>>> {
    let (batch, slots) = (hidden.nrows(), memory.shape()[1]);
    let mut weightings = Vec::with_capacity(previous.len());
    for (i, (head, w_prev)) in heads.iter().zip(previous).enumerate() {
        let w = head
            .next_weighting(hidden, w_prev.view(), memory)
            .map_err(|source| {
                NtmError::collaborator(t, format!("{kind}[{i}].next_weighting"), source)
            })?;
        expect_dim(
            || format!("{kind}[{i}] weighting"),
            &[batch, slots],
            w.shape(),
        )?;
        weightings.push(w);
    }
    Ok(weightings)
}

fn component(i: usize, method: &str) -> String {
    format!("write_head[{i}].{method}")
}

fn prefixed<'a>(params: Vec<Param<'a>>, prefix: &str) -> Vec<Param<'a>> {
    params.into_iter().map(|p| p.prefixed(prefix)).collect()
}

fn tile_rows(row: ArrayView1<f64>, batch: usize) -> Array2<f64> {
    Array2::from_shape_fn((batch, row.len()), |(_, j)| row[j])
}

fn check_head<H: Addressing + ?Sized>(
    name: &str,
    head: &H,
    slots: usize,
    width: usize,
) -> Result<()> {
    if (head.slots(), head.slot_width()) != (slots, width) {
        return Err(NtmError::shape(
            format!("{name} memory shape"),
            &[slots, width],
            &[head.slots(), head.slot_width()],
        ));
    }
    check_len(&format!("{name} weights_init"), head.weights_init(), slots)
}

fn check_len(context: &str, values: ArrayView1<f64>, expected: usize) -> Result<()> {
    if values.len() != expected {
        return Err(NtmError::shape(context, &[expected], &[values.len()]));
    }
    Ok(())
}

fn check_weightings(kind: &str, weightings: &[Array2<f64>], heads: usize) -> Result<()> {
    if weightings.len() != heads {
        return Err(NtmError::shape(
            format!("carried {kind} weightings"),
            &[heads],
            &[weightings.len()],
        ));
    }
    Ok(())
}

/// `context` is only built when the shapes disagree.
fn expect_dim(
    context: impl FnOnce() -> String,
    expected: &[usize],
    actual: &[usize],
) -> Result<()> {
    if expected != actual {
        return Err(NtmError::shape(context(), expected, actual));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::BoxError;
    use approx::assert_abs_diff_eq;
    use ndarray::{Array1, array};
    use std::cell::Cell;

    /// Head with fixed weighting and fixed erase/add content.
    struct FixedHead {
        weighting: Array1<f64>,
        width: usize,
        erase: Array1<f64>,
        add: Array1<f64>,
        sign: Option<Array1<f64>>,
    }

    impl FixedHead {
        fn reader(weighting: Array1<f64>, width: usize) -> Self {
            Self {
                weighting,
                width,
                erase: Array1::zeros(width),
                add: Array1::zeros(width),
                sign: None,
            }
        }

        fn writer(weighting: Array1<f64>, erase: Array1<f64>, add: Array1<f64>) -> Self {
            let width = erase.len();
            Self {
                weighting,
                width,
                erase,
                add,
                sign: None,
            }
        }
    }

    impl Addressing for FixedHead {
        fn slots(&self) -> usize {
            self.weighting.len()
        }

        fn slot_width(&self) -> usize {
            self.width
        }

        fn weights_init(&self) -> ArrayView1<'_, f64> {
            self.weighting.view()
        }

        fn next_weighting(
            &self,
            hidden: ArrayView2<f64>,
            _previous: ArrayView2<f64>,
            _memory: ArrayView3<f64>,
        ) -> std::result::Result<Array2<f64>, BoxError> {
            Ok(tile_rows(self.weighting.view(), hidden.nrows()))
        }
    }

    impl WriteContent for FixedHead {
        fn erase(&self, hidden: ArrayView2<f64>) -> std::result::Result<Array2<f64>, BoxError> {
            Ok(tile_rows(self.erase.view(), hidden.nrows()))
        }

        fn add(&self, hidden: ArrayView2<f64>) -> std::result::Result<Array2<f64>, BoxError> {
            Ok(tile_rows(self.add.view(), hidden.nrows()))
        }

        fn sign_add(
            &self,
            hidden: ArrayView2<f64>,
        ) -> std::result::Result<Option<Array2<f64>>, BoxError> {
            let batch = hidden.nrows();
            Ok(self.sign.as_ref().map(|s| tile_rows(s.view(), batch)))
        }
    }

    /// Hidden state is the read vector plus the input; state counts steps.
    struct EchoController {
        input_width: usize,
        read_width: usize,
        init: Array1<f64>,
        counter: Array1<f64>,
    }

    impl EchoController {
        fn new(input_width: usize, read_width: usize) -> Self {
            Self {
                input_width,
                read_width,
                init: Array1::zeros(read_width),
                counter: Array1::zeros(1),
            }
        }
    }

    impl Controller for EchoController {
        fn input_width(&self) -> usize {
            self.input_width
        }

        fn read_width(&self) -> usize {
            self.read_width
        }

        fn hidden_width(&self) -> usize {
            self.init.len()
        }

        fn state_width(&self) -> usize {
            1
        }

        fn initial_hidden(&self) -> ArrayView1<'_, f64> {
            self.init.view()
        }

        fn initial_state(&self) -> ArrayView1<'_, f64> {
            self.counter.view()
        }

        fn step(
            &self,
            input: ArrayView2<f64>,
            reads: ArrayView2<f64>,
            previous_state: ArrayView2<f64>,
        ) -> std::result::Result<(Array2<f64>, Array2<f64>), BoxError> {
            let offset = input.sum_axis(Axis(1)).insert_axis(Axis(1));
            Ok((&reads + &offset, &previous_state + 1.0))
        }
    }

    /// Read head that fails once `fail_at` weightings have been produced.
    struct FailingHead {
        inner: FixedHead,
        calls: Cell<usize>,
        fail_at: usize,
    }

    impl Addressing for FailingHead {
        fn slots(&self) -> usize {
            self.inner.slots()
        }

        fn slot_width(&self) -> usize {
            self.inner.slot_width()
        }

        fn weights_init(&self) -> ArrayView1<'_, f64> {
            self.inner.weights_init()
        }

        fn next_weighting(
            &self,
            hidden: ArrayView2<f64>,
            previous: ArrayView2<f64>,
            memory: ArrayView3<f64>,
        ) -> std::result::Result<Array2<f64>, BoxError> {
            let n = self.calls.get();
            self.calls.set(n + 1);
            if n == self.fail_at {
                return Err("addressing exploded".into());
            }
            self.inner.next_weighting(hidden, previous, memory)
        }
    }

    /// Read head whose new weighting covers one slot too many.
    struct OverreachingHead(FixedHead);

    impl Addressing for OverreachingHead {
        fn slots(&self) -> usize {
            self.0.slots()
        }

        fn slot_width(&self) -> usize {
            self.0.slot_width()
        }

        fn weights_init(&self) -> ArrayView1<'_, f64> {
            self.0.weights_init()
        }

        fn next_weighting(
            &self,
            hidden: ArrayView2<f64>,
            _previous: ArrayView2<f64>,
            _memory: ArrayView3<f64>,
        ) -> std::result::Result<Array2<f64>, BoxError> {
            Ok(Array2::zeros((hidden.nrows(), self.slots() + 1)))
        }
    }

    fn engine(heads: Vec<Head>, memory_init: Array2<f64>) -> Result<NtmEngine<EchoController>> {
        let width = memory_init.ncols();
        let reads = heads.iter().filter(|h| !h.is_write()).count();
        NtmEngine::new(
            Memory::new(memory_init, false)?,
            EchoController::new(1, reads.max(1) * width),
            heads,
            None,
        )
    }

    /// One write head and one read head over a single `[1.0]` slot.
    fn unit_engine(writer: FixedHead) -> NtmEngine<EchoController> {
        engine(
            vec![
                Head::write(writer),
                Head::read(FixedHead::reader(array![1.0], 1)),
            ],
            Array2::ones((1, 1)),
        )
        .unwrap()
    }

    /// Same, over two zeroed slots of width 2.
    fn engine_with(writer: FixedHead) -> NtmEngine<EchoController> {
        engine(
            vec![
                Head::write(writer),
                Head::read(FixedHead::reader(array![1.0, 0.0], 2)),
            ],
            Array2::zeros((2, 2)),
        )
        .unwrap()
    }

    fn step_error(engine: &NtmEngine<EchoController>, state: RecurrentState) -> NtmError {
        engine
            .step(0, Array2::zeros((state.batch_size(), 1)).view(), state)
            .unwrap_err()
    }

    fn mismatch_context(err: NtmError) -> String {
        match err {
            NtmError::ShapeMismatch { context, .. } => context,
            other => panic!("expected shape mismatch, got {other:?}"),
        }
    }

    #[test]
    fn test_requires_both_head_kinds() {
        let w = array![1.0, 0.0];
        let only_reads = engine(
            vec![Head::read(FixedHead::reader(w.clone(), 2))],
            Array2::ones((2, 2)),
        );
        assert!(matches!(only_reads, Err(NtmError::Configuration(_))));

        let writer = FixedHead::writer(w, array![0.0, 0.0], array![0.0, 0.0]);
        let only_writes = engine(vec![Head::write(writer)], Array2::ones((2, 2)));
        assert!(matches!(only_writes, Err(NtmError::Configuration(_))));

        let empty = engine(Vec::new(), Array2::ones((2, 2)));
        assert!(matches!(empty, Err(NtmError::Configuration(_))));
    }

    #[test]
    fn test_head_shape_must_match_memory() {
        let writer = FixedHead::writer(array![1.0, 0.0], array![0.0, 0.0], array![0.0, 0.0]);
        let result = engine(
            vec![
                Head::write(writer),
                Head::read(FixedHead::reader(array![1.0, 0.0, 0.0], 2)),
            ],
            Array2::ones((2, 2)),
        );
        assert!(matches!(result, Err(NtmError::ShapeMismatch { .. })));
    }

    #[test]
    fn test_invalid_grad_clipping_rejected() {
        let heads = vec![
            Head::write(FixedHead::writer(array![1.0], array![0.0], array![0.0])),
            Head::read(FixedHead::reader(array![1.0], 1)),
        ];
        let result = NtmEngine::new(
            Memory::constant(1, 1, 0.0).unwrap(),
            EchoController::new(1, 1),
            heads,
            Some(f64::NAN),
        );
        assert!(matches!(result, Err(NtmError::Configuration(_))));
    }

    #[test]
    fn test_initial_state_is_seeded() {
        let writer = FixedHead::writer(array![0.0, 1.0], array![0.0, 0.0], array![0.0, 0.0]);
        let engine = engine(
            vec![
                Head::write(writer),
                Head::read(FixedHead::reader(array![0.5, 0.5], 2)),
            ],
            array![[1.0, 2.0], [3.0, 4.0]],
        )
        .unwrap();
        let state = engine.initial_state(3);
        assert_eq!(state.memory.dim(), (3, 2, 2));
        for bank in state.memory.view().outer_iter() {
            assert_eq!(bank, array![[1.0, 2.0], [3.0, 4.0]]);
        }
        let seeded_write = tile_rows(array![0.0, 1.0].view(), 3);
        let seeded_read = tile_rows(array![0.5, 0.5].view(), 3);
        assert_eq!(state.write_weightings[0], seeded_write);
        assert_eq!(state.read_weightings[0], seeded_read);
        assert_eq!(state.hidden, Array2::<f64>::zeros((3, 2)));
    }

    #[test]
    fn test_add_survives_own_erase() {
        let writer = FixedHead::writer(array![1.0, 0.0], array![1.0, 1.0], array![0.5, -0.5]);
        let engine = engine(
            vec![
                Head::write(writer),
                Head::read(FixedHead::reader(array![1.0, 0.0], 2)),
            ],
            Array2::ones((2, 2)),
        )
        .unwrap();
        let state = engine
            .step(0, Array2::zeros((1, 1)).view(), engine.initial_state(1))
            .unwrap();
        assert!(state.memory.is_finite());
        let bank = state.memory.into_inner();
        assert_eq!(bank.index_axis(Axis(0), 0), array![[0.5, -0.5], [1.0, 1.0]]);
        // The read head saw the written slot.
        assert_eq!(state.hidden, array![[0.5, -0.5]]);
    }

    #[test]
    fn test_add_survives_later_heads_erase() {
        let engine = engine(
            vec![
                Head::write(FixedHead::writer(array![1.0], array![1.0], array![2.0])),
                Head::write(FixedHead::writer(array![1.0], array![1.0], array![3.0])),
                Head::read(FixedHead::reader(array![1.0], 1)),
            ],
            Array2::from_elem((1, 1), 7.0),
        )
        .unwrap();
        let state = engine
            .step(0, Array2::zeros((1, 1)).view(), engine.initial_state(1))
            .unwrap();
        assert_abs_diff_eq!(state.memory.view()[[0, 0, 0]], 5.0, epsilon = 1e-12);
    }

    #[test]
    fn test_sign_gate_scales_add() {
        let mut writer = FixedHead::writer(array![1.0], array![1.0], array![2.0]);
        writer.sign = Some(array![-0.5]);
        let engine = unit_engine(writer);
        let state = engine
            .step(0, Array2::zeros((1, 1)).view(), engine.initial_state(1))
            .unwrap();
        assert_abs_diff_eq!(state.memory.view()[[0, 0, 0]], -1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_reads_concatenate_in_list_order() {
        let writer = FixedHead::writer(array![1.0, 0.0], array![0.0, 0.0], array![0.0, 0.0]);
        let engine = engine(
            vec![
                Head::read(FixedHead::reader(array![0.0, 1.0], 2)),
                Head::write(writer),
                Head::read(FixedHead::reader(array![1.0, 0.0], 2)),
            ],
            array![[1.0, 2.0], [3.0, 4.0]],
        )
        .unwrap();
        assert_eq!(engine.num_write_heads(), 1);
        assert_eq!(engine.num_read_heads(), 2);
        let state = engine
            .step(0, Array2::zeros((1, 1)).view(), engine.initial_state(1))
            .unwrap();
        assert_eq!(state.hidden, array![[3.0, 4.0, 1.0, 2.0]]);
    }

    #[test]
    fn test_forward_shape_and_controller_state() {
        let writer = FixedHead::writer(array![1.0, 0.0], array![0.0, 0.0], array![1.0, 1.0]);
        let engine = engine(
            vec![
                Head::write(writer),
                Head::read(FixedHead::reader(array![1.0, 0.0], 2)),
            ],
            Array2::zeros((2, 2)),
        )
        .unwrap();
        let input = Array3::zeros((2, 4, 1));
        let hidden = engine.forward(input.view()).unwrap();
        assert_eq!(hidden.dim(), (2, 4, 2));
        // One add per step accumulates in slot 0.
        for t in 0..4 {
            assert_abs_diff_eq!(hidden[[0, t, 0]], (t + 1) as f64, epsilon = 1e-12);
        }

        let trace = engine.trace(input.view()).unwrap();
        assert_eq!(trace.controller_state.dim(), (2, 4, 1));
        assert_eq!(trace.controller_state[[1, 3, 0]], 4.0);
        assert_eq!(trace.memory.dim(), (2, 4, 2, 2));
        assert_eq!(trace.write_weightings().len(), 1);
        assert_eq!(trace.read_weightings().len(), 1);
        assert_eq!(trace.hidden, hidden);
    }

    #[test]
    fn test_run_selects_detail() {
        let engine = unit_engine(FixedHead::writer(array![1.0], array![0.0], array![1.0]));
        let input = Array3::zeros((1, 2, 1));
        let hidden = engine.run(input.view(), false).unwrap();
        assert!(hidden.clone().into_trace().is_none());
        let full = engine.run(input.view(), true).unwrap();
        assert_eq!(full.hidden(), hidden.hidden());
        assert!(full.into_trace().is_some());
    }

    #[test]
    fn test_wrong_feature_width() {
        let engine = unit_engine(FixedHead::writer(array![1.0], array![0.0], array![1.0]));
        let result = engine.forward(Array3::zeros((1, 2, 3)).view());
        assert!(matches!(result, Err(NtmError::ShapeMismatch { .. })));
    }

    #[test]
    fn test_carried_state_must_match_engine() {
        let uniform = Array1::from_elem(6, 1.0 / 6.0);
        let engine = engine(
            vec![
                Head::write(FixedHead::writer(uniform.clone(), array![0.0], array![1.0])),
                Head::read(FixedHead::reader(uniform, 1)),
            ],
            Array2::zeros((6, 1)),
        )
        .unwrap();

        let mut short_read = engine.initial_state(1);
        short_read.read_weightings[0] = Array2::from_elem((1, 5), 0.2);
        let context = mismatch_context(step_error(&engine, short_read));
        assert_eq!(context, "carried weighting");

        let mut missing_write = engine.initial_state(1);
        missing_write.write_weightings.clear();
        let context = mismatch_context(step_error(&engine, missing_write));
        assert_eq!(context, "carried write_head weightings");

        let mut wide_batch = engine.initial_state(1);
        wide_batch.memory = engine.memory().tile(2);
        let context = mismatch_context(step_error(&engine, wide_batch));
        assert_eq!(context, "carried memory");

        let mut stale_controller = engine.initial_state(1);
        stale_controller.controller_state = Array2::zeros((1, 3));
        let context = mismatch_context(step_error(&engine, stale_controller));
        assert_eq!(context, "carried controller state");
    }

    #[test]
    fn test_erase_of_wrong_width_rejected() {
        let mut writer = FixedHead::writer(array![1.0], array![0.0], array![1.0]);
        writer.erase = array![0.0, 0.0];
        let engine = unit_engine(writer);
        let err = step_error(&engine, engine.initial_state(2));
        assert_eq!(mismatch_context(err), "write_head[0].erase");
    }

    #[test]
    fn test_sign_gate_of_wrong_width_rejected() {
        let mut writer = FixedHead::writer(array![1.0, 0.0], array![0.0, 0.0], array![1.0, 1.0]);
        writer.sign = Some(array![1.0, 1.0, 1.0]);
        let engine = engine_with(writer);
        let err = step_error(&engine, engine.initial_state(1));
        assert_eq!(mismatch_context(err), "write_head[0].sign_add");

        // A full-width gate is accepted.
        let mut writer = FixedHead::writer(array![1.0, 0.0], array![0.0, 0.0], array![1.0, 1.0]);
        writer.sign = Some(array![1.0, -1.0]);
        let engine = engine_with(writer);
        let state = engine
            .step(0, Array2::zeros((1, 1)).view(), engine.initial_state(1))
            .unwrap();
        assert_eq!(state.hidden, array![[1.0, -1.0]]);
    }

    #[test]
    fn test_controller_hidden_of_wrong_width_rejected() {
        let mut controller = EchoController::new(1, 1);
        // Claims two hidden units but echoes a single read.
        controller.init = Array1::zeros(2);
        let engine = NtmEngine::new(
            Memory::constant(1, 1, 0.0).unwrap(),
            controller,
            vec![
                Head::write(FixedHead::writer(array![1.0], array![0.0], array![1.0])),
                Head::read(FixedHead::reader(array![1.0], 1)),
            ],
            None,
        )
        .unwrap();
        let err = step_error(&engine, engine.initial_state(1));
        assert_eq!(mismatch_context(err), "controller hidden");
    }

    #[test]
    fn test_new_weighting_of_wrong_width_rejected() {
        let engine = engine(
            vec![
                Head::write(FixedHead::writer(array![1.0], array![0.0], array![1.0])),
                Head::read(OverreachingHead(FixedHead::reader(array![1.0], 1))),
            ],
            Array2::zeros((1, 1)),
        )
        .unwrap();
        let err = step_error(&engine, engine.initial_state(1));
        assert_eq!(mismatch_context(err), "read_head[0] weighting");
    }

    #[test]
    fn test_collaborator_error_carries_step() {
        let failing = FailingHead {
            inner: FixedHead::reader(array![1.0], 1),
            calls: Cell::new(0),
            fail_at: 2,
        };
        let engine = engine(
            vec![
                Head::write(FixedHead::writer(array![1.0], array![0.0], array![1.0])),
                Head::read(failing),
            ],
            Array2::zeros((1, 1)),
        )
        .unwrap();
        let err = engine.forward(Array3::zeros((1, 5, 1)).view()).unwrap_err();
        match &err {
            NtmError::Collaborator {
                step,
                component,
                ..
            } => {
                assert_eq!(*step, 2);
                assert_eq!(component, "read_head[0].next_weighting");
            }
            other => panic!("expected collaborator error, got {other:?}"),
        }
        assert_eq!(
            std::error::Error::source(&err).map(|s| s.to_string()),
            Some("addressing exploded".to_string())
        );
    }

    #[test]
    fn test_empty_sequence() {
        let engine = unit_engine(FixedHead::writer(array![1.0], array![0.0], array![1.0]));
        let hidden = engine.forward(Array3::zeros((3, 0, 1)).view()).unwrap();
        assert_eq!(hidden.dim(), (3, 0, 1));
    }
}
