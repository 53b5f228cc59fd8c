//! Cross-module end-to-end scenarios for the reactor core (spec.md §8
//! "End-to-end scenarios" 1-4), exercising `EventLoopThread` the way a real
//! caller would rather than driving `EventLoop::run` in-process.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use reactor_mysql::EventLoopThread;
use serial_test::serial;

/// Scenario 1: wake from idle. Submit a task from a different thread than
/// the one running the loop; expect the flag set and the loop thread to
/// exit within 50 ms.
#[test]
#[serial]
fn wake_from_idle_task_runs_and_quits_promptly() {
    let mut thread = EventLoopThread::new("wake-from-idle").expect("spawn loop thread");
    let loop_ = thread.get_loop();
    thread.run();

    let flag = Arc::new(std::sync::atomic::AtomicBool::new(false));
    let flag_clone = Arc::clone(&flag);
    let loop_for_quit = loop_.clone();

    let start = Instant::now();
    loop_.queue_in_loop(move || {
        flag_clone.store(true, Ordering::SeqCst);
        loop_for_quit.quit();
    });
    thread.wait();

    assert!(flag.load(Ordering::SeqCst));
    assert!(start.elapsed() < Duration::from_millis(50));
}

/// Scenario 2: one-shot timer. Schedule at `now + 100ms`; expect fire
/// within [100ms, 150ms].
#[test]
#[serial]
fn one_shot_timer_fires_within_window() {
    let mut thread = EventLoopThread::new("one-shot-timer").expect("spawn loop thread");
    let loop_ = thread.get_loop();
    thread.run();

    let (tx, rx) = std::sync::mpsc::sync_channel::<Instant>(0);
    let scheduled_at = Instant::now();
    let loop_for_quit = loop_.clone();
    loop_.run_after(Duration::from_millis(100), move || {
        let _ = tx.send(Instant::now());
        loop_for_quit.quit();
    });

    let fired_at = rx.recv_timeout(Duration::from_millis(500)).expect("timer fired");
    thread.wait();

    let elapsed = fired_at - scheduled_at;
    assert!(elapsed >= Duration::from_millis(100), "fired too early: {elapsed:?}");
    assert!(elapsed <= Duration::from_millis(150), "fired too late: {elapsed:?}");
}

/// Scenario 3: periodic timer cancellation. Every 50ms increment a counter;
/// after 3 increments, cancel. Expect the counter stops at 3.
#[test]
#[serial]
fn periodic_timer_stops_after_cancel() {
    let mut thread = EventLoopThread::new("periodic-cancel").expect("spawn loop thread");
    let loop_ = thread.get_loop();
    thread.run();

    let counter = Arc::new(AtomicU32::new(0));
    let counter_clone = Arc::clone(&counter);
    let loop_for_cancel = loop_.clone();
    let timer_id = std::sync::Mutex::new(None);
    let timer_id_for_cb = std::sync::Arc::new(timer_id);
    let timer_id_clone = Arc::clone(&timer_id_for_cb);

    let id = loop_.run_every(Duration::from_millis(50), move || {
        let count = counter_clone.fetch_add(1, Ordering::SeqCst) + 1;
        if count == 3 {
            if let Some(id) = *timer_id_clone.lock().unwrap() {
                loop_for_cancel.cancel_timer(id);
            }
        }
    });
    *timer_id_for_cb.lock().unwrap() = Some(id);

    // Give the timer time to fire 3 times and be cancelled, then a further
    // window to prove no 4th fire sneaks in before quitting.
    std::thread::sleep(Duration::from_millis(400));
    assert_eq!(counter.load(Ordering::SeqCst), 3);

    loop_.quit();
    thread.wait();
    assert_eq!(counter.load(Ordering::SeqCst), 3);
}

/// Scenario 4: timer ordering. Schedule deadlines at +10ms, +5ms, +20ms in
/// that submission order; expect fire order 2, 1, 3.
#[test]
#[serial]
fn timers_fire_in_deadline_order_not_submission_order() {
    let mut thread = EventLoopThread::new("timer-ordering").expect("spawn loop thread");
    let loop_ = thread.get_loop();
    thread.run();

    let order = Arc::new(std::sync::Mutex::new(Vec::<u32>::new()));

    let order1 = Arc::clone(&order);
    loop_.run_after(Duration::from_millis(10), move || order1.lock().unwrap().push(1));
    let order2 = Arc::clone(&order);
    loop_.run_after(Duration::from_millis(5), move || order2.lock().unwrap().push(2));
    let order3 = Arc::clone(&order);
    let loop_for_quit = loop_.clone();
    loop_.run_after(Duration::from_millis(20), move || {
        order3.lock().unwrap().push(3);
        loop_for_quit.quit();
    });

    thread.wait();
    assert_eq!(*order.lock().unwrap(), vec![2, 1, 3]);
}
